//! Reference evaluator.
//!
//! Runs functions of a [`Module`] directly on the IR, both before and after
//! lowering. The abstract `mhlo.rng_get_and_update_state` op is interpreted
//! with its reference meaning (read the counter, bump it, pack the old
//! value), so the two forms of a module can be compared call for call.
//!
//! Counter cells live in the interpreter, not the module: they are
//! initialized from `memref.global` definitions when the interpreter is
//! created and persist across calls. When the abstract op runs before any
//! cell with the configured symbol exists, the cell is created on first use
//! with the configured seed, which is exactly what lowering would produce.

use crate::config::LowerConfig;
use crate::debug::{format_with_loc, SourceLoc};
use crate::ir::{mask_for_bits, IntType, Module, OpId, OpKind, Operation, Type, ValueId};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while evaluating a function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unknown function '@{0}'")]
    UnknownFunction(String),

    #[error("function '@{func}' expects {expected} argument(s), got {got}")]
    ArityMismatch { func: String, expected: usize, got: usize },

    #[error("value %{0} used before it was defined")]
    UnboundValue(u32),

    #[error("{}", format_with_loc(.location, &format!("cannot evaluate '{}'", .op)))]
    UnsupportedOp { op: String, location: Option<SourceLoc> },

    #[error("{}", format_with_loc(.location, &format!("'{}' expected {}, got {}", .op, .expected, .found)))]
    TypeMismatch {
        op: String,
        expected: String,
        found: String,
        location: Option<SourceLoc>,
    },

    #[error("no global named '@{0}'")]
    MissingGlobal(String),

    #[error("{}", format_with_loc(.location, &format!("cannot pack {} x {}-bit elements from a {}-bit counter", .elements, .word_size, .counter_bits)))]
    PackedWidthOverflow {
        elements: u64,
        word_size: u32,
        counter_bits: u32,
        location: Option<SourceLoc>,
    },
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtValue {
    /// Integer of a given type; bits above the width are always zero
    Int { ty: IntType, bits: u128 },
    /// Integer tensor, row-major
    Tensor { ty: Type, elems: Vec<u128> },
    /// Reference to a global cell
    Ref(String),
}

impl RtValue {
    /// Integer value, masked to the type width.
    pub fn int(ty: IntType, bits: u128) -> Self {
        RtValue::Int { ty, bits: bits & ty.mask() }
    }

    /// Signless integer of the given width.
    pub fn from_u128(bits: u32, value: u128) -> Self {
        Self::int(IntType::signless(bits), value)
    }

    /// Integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<u128> {
        match self {
            RtValue::Int { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    /// Tensor elements, if this is a tensor.
    pub fn as_elems(&self) -> Option<&[u128]> {
        match self {
            RtValue::Tensor { elems, .. } => Some(elems),
            _ => None,
        }
    }

    fn kind_name(&self) -> String {
        match self {
            RtValue::Int { ty, .. } => ty.to_string(),
            RtValue::Tensor { ty, .. } => ty.to_string(),
            RtValue::Ref(sym) => format!("reference to @{}", sym),
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Int { ty, bits } => write!(f, "{} : {}", bits, ty),
            RtValue::Tensor { ty, elems } => {
                let elems: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}] : {}", elems.join(", "), ty)
            }
            RtValue::Ref(sym) => write!(f, "@{}", sym),
        }
    }
}

/// A global storage cell.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cell {
    elem: IntType,
    value: u128,
}

/// Sign-extend `value` from `from` bits to `to` bits.
pub fn sign_extend(value: u128, from: u32, to: u32) -> u128 {
    if from == 0 || from >= to {
        return value & mask_for_bits(to);
    }
    let negative = (value >> (from - 1)) & 1 == 1;
    if negative {
        (value | !mask_for_bits(from)) & mask_for_bits(to)
    } else {
        value & mask_for_bits(from)
    }
}

/// Split `value` into `count` chunks of `word` bits, most significant first.
pub fn pack_chunks(value: u128, word: u32, count: u64) -> Vec<u128> {
    (0..count)
        .rev()
        .map(|i| {
            let shift = i as u128 * word as u128;
            let shifted = if shift >= 128 { 0 } else { value >> shift };
            shifted & mask_for_bits(word)
        })
        .collect()
}

/// Interpreter over one module.
pub struct Interpreter<'m> {
    module: &'m Module,
    config: LowerConfig,
    globals: IndexMap<String, Cell>,
}

impl<'m> Interpreter<'m> {
    /// Create an interpreter with the default counter configuration.
    pub fn new(module: &'m Module) -> Self {
        Self::with_config(module, &LowerConfig::default())
    }

    /// Create an interpreter whose abstract RNG ops use `config`'s counter.
    pub fn with_config(module: &'m Module, config: &LowerConfig) -> Self {
        let mut globals = IndexMap::new();
        for &id in module.body() {
            if let Some(OpKind::Global { sym, ty, init, .. }) = module.op(id).map(|op| &op.kind) {
                globals.insert(sym.clone(), Cell { elem: ty.element_type(), value: *init });
            }
        }
        Self { module, config: config.clone(), globals }
    }

    /// Current value of a global cell.
    pub fn global(&self, sym: &str) -> Option<u128> {
        self.globals.get(sym).map(|cell| cell.value)
    }

    /// Overwrite a global cell.
    pub fn set_global(&mut self, sym: &str, value: u128) -> Result<(), EvalError> {
        let cell = self.globals.get_mut(sym).ok_or_else(|| EvalError::MissingGlobal(sym.to_string()))?;
        cell.value = value & cell.elem.mask();
        Ok(())
    }

    /// Call a function with integer arguments, typed after its parameters.
    pub fn call_ints(&mut self, func: &str, args: &[u128]) -> Result<Vec<RtValue>, EvalError> {
        let id = self.module.function(func).ok_or_else(|| EvalError::UnknownFunction(func.to_string()))?;
        let params = self.module.op(id).map(|op| op.args.clone()).unwrap_or_default();
        if params.len() != args.len() {
            return Err(EvalError::ArityMismatch { func: func.to_string(), expected: params.len(), got: args.len() });
        }
        let mut values = Vec::with_capacity(args.len());
        for (&param, &arg) in params.iter().zip(args) {
            let ty = self.module.value_type(param).map_err(|_| EvalError::UnboundValue(param.id()))?;
            match ty {
                Type::Int(ty) => values.push(RtValue::int(*ty, arg)),
                other => {
                    return Err(EvalError::TypeMismatch {
                        op: format!("@{}", func),
                        expected: "integer parameters".into(),
                        found: other.to_string(),
                        location: None,
                    })
                }
            }
        }
        self.call(func, &values)
    }

    /// Call a function by name.
    pub fn call(&mut self, func: &str, args: &[RtValue]) -> Result<Vec<RtValue>, EvalError> {
        let module = self.module;
        let id = module.function(func).ok_or_else(|| EvalError::UnknownFunction(func.to_string()))?;
        let op = module.op(id).ok_or_else(|| EvalError::UnknownFunction(func.to_string()))?;
        if op.args.len() != args.len() {
            return Err(EvalError::ArityMismatch { func: func.to_string(), expected: op.args.len(), got: args.len() });
        }
        log::trace!("Calling @{} with {} argument(s)", func, args.len());

        let mut env: HashMap<ValueId, RtValue> = op.args.iter().copied().zip(args.iter().cloned()).collect();
        for &child in &op.region {
            let Some(inner) = module.op(child) else { continue };
            if let OpKind::Return = inner.kind {
                return inner.operands.iter().map(|v| fetch(&env, *v).cloned()).collect();
            }
            let results = self.step(child, inner, &env)?;
            env.extend(inner.results.iter().copied().zip(results));
        }
        Ok(Vec::new())
    }

    fn result_type(&self, op: &Operation) -> Result<Type, EvalError> {
        let result = op.result().ok_or_else(|| unsupported(op))?;
        self.module
            .value_type(result)
            .cloned()
            .map_err(|_| EvalError::UnboundValue(result.id()))
    }

    fn int_operand(&self, env: &HashMap<ValueId, RtValue>, op: &Operation, index: usize) -> Result<(IntType, u128), EvalError> {
        let value = op.operands.get(index).ok_or_else(|| unsupported(op))?;
        match fetch(env, *value)? {
            RtValue::Int { ty, bits } => Ok((*ty, *bits)),
            other => Err(mismatch(op, "an integer operand", other.kind_name())),
        }
    }

    fn cell_operand(&self, env: &HashMap<ValueId, RtValue>, op: &Operation, index: usize) -> Result<String, EvalError> {
        let value = op.operands.get(index).ok_or_else(|| unsupported(op))?;
        match fetch(env, *value)? {
            RtValue::Ref(sym) => Ok(sym.clone()),
            other => Err(mismatch(op, "a memref operand", other.kind_name())),
        }
    }

    fn int_result(&self, op: &Operation, bits: u128) -> Result<Vec<RtValue>, EvalError> {
        match self.result_type(op)? {
            Type::Int(ty) => Ok(vec![RtValue::int(ty, bits)]),
            other => Err(mismatch(op, "an integer result", other.to_string())),
        }
    }

    fn step(&mut self, id: OpId, op: &Operation, env: &HashMap<ValueId, RtValue>) -> Result<Vec<RtValue>, EvalError> {
        log::trace!("Evaluating {} '{}'", id, op.name());
        match &op.kind {
            OpKind::Constant { value } => self.int_result(op, *value),
            OpKind::AddI => {
                let (_, lhs) = self.int_operand(env, op, 0)?;
                let (_, rhs) = self.int_operand(env, op, 1)?;
                self.int_result(op, lhs.wrapping_add(rhs))
            }
            OpKind::ShRUI => {
                let (ty, value) = self.int_operand(env, op, 0)?;
                let (_, amount) = self.int_operand(env, op, 1)?;
                // Shifting by the width or more yields zero.
                let shifted = if amount >= ty.bits as u128 { 0 } else { value >> amount };
                self.int_result(op, shifted)
            }
            OpKind::TruncI | OpKind::ExtUI => {
                let (_, value) = self.int_operand(env, op, 0)?;
                self.int_result(op, value)
            }
            OpKind::ExtSI => {
                let (from, value) = self.int_operand(env, op, 0)?;
                let to = self.result_type(op)?.bit_width();
                self.int_result(op, sign_extend(value, from.bits, to))
            }
            OpKind::GetGlobal { sym } => {
                if !self.globals.contains_key(sym) {
                    return Err(EvalError::MissingGlobal(sym.clone()));
                }
                Ok(vec![RtValue::Ref(sym.clone())])
            }
            OpKind::Load => {
                let sym = self.cell_operand(env, op, 0)?;
                let cell = self.globals.get(&sym).ok_or(EvalError::MissingGlobal(sym.clone()))?;
                Ok(vec![RtValue::int(cell.elem, cell.value)])
            }
            OpKind::Store => {
                let (_, value) = self.int_operand(env, op, 0)?;
                let sym = self.cell_operand(env, op, 1)?;
                self.set_global(&sym, value)?;
                Ok(Vec::new())
            }
            OpKind::FromElements => {
                let ty = self.result_type(op)?;
                let elems = (0..op.operands.len())
                    .map(|i| self.int_operand(env, op, i).map(|(_, bits)| bits))
                    .collect::<Result<Vec<u128>, EvalError>>()?;
                if ty.num_elements() != elems.len() as u64 {
                    return Err(mismatch(op, &format!("{} element(s)", ty.num_elements()), elems.len().to_string()));
                }
                Ok(vec![RtValue::Tensor { ty, elems }])
            }
            OpKind::UnrealizedCast => {
                let to = self.result_type(op)?;
                let value = op.operands.first().ok_or_else(|| unsupported(op))?;
                let source = fetch(env, *value)?;
                match (source, &to) {
                    (RtValue::Tensor { elems, .. }, Type::Tensor { .. }) if elems.len() as u64 == to.num_elements() => {
                        let mask = to.element_type().mask();
                        let elems = elems.iter().map(|e| e & mask).collect();
                        Ok(vec![RtValue::Tensor { elems, ty: to.clone() }])
                    }
                    (RtValue::Int { bits, .. }, Type::Int(ty)) => Ok(vec![RtValue::int(*ty, *bits)]),
                    (other, _) => Err(mismatch(op, &to.to_string(), other.kind_name())),
                }
            }
            OpKind::RngGetAndUpdateState => self.rng_get_and_update_state(op, env),
            _ => Err(unsupported(op)),
        }
    }

    /// Reference semantics of the abstract op.
    fn rng_get_and_update_state(&mut self, op: &Operation, env: &HashMap<ValueId, RtValue>) -> Result<Vec<RtValue>, EvalError> {
        let (delta_ty, delta) = self.int_operand(env, op, 0)?;
        let result_ty = self.result_type(op)?;
        if !result_ty.is_tensor() || !result_ty.element_type().is_valid() {
            return Err(mismatch(op, "a tensor of valid integers", result_ty.to_string()));
        }

        let symbol = self.config.state_symbol.clone();
        let width = self.config.counter_bits;
        let seed = self.config.seed;
        if !delta_ty.is_valid() || delta_ty.bits > width {
            return Err(mismatch(op, &format!("a delta of at most {} bits", width), delta_ty.to_string()));
        }
        // Same shapes as the lowering accepts.
        if !result_ty.packed_bits().is_some_and(|total| total <= width as u64) {
            return Err(EvalError::PackedWidthOverflow {
                elements: result_ty.num_elements(),
                word_size: result_ty.bit_width(),
                counter_bits: width,
                location: op.loc.clone(),
            });
        }
        let cell = self
            .globals
            .entry(symbol)
            .or_insert_with(|| Cell { elem: IntType::signless(width), value: seed & mask_for_bits(width) });

        let wide_delta = if delta_ty.is_signed() {
            sign_extend(delta, delta_ty.bits, cell.elem.bits)
        } else {
            delta & cell.elem.mask()
        };
        let old = cell.value;
        cell.value = old.wrapping_add(wide_delta) & cell.elem.mask();

        let elems = pack_chunks(old, result_ty.bit_width(), result_ty.num_elements());
        Ok(vec![RtValue::Tensor { ty: result_ty, elems }])
    }
}

fn fetch(env: &HashMap<ValueId, RtValue>, value: ValueId) -> Result<&RtValue, EvalError> {
    env.get(&value).ok_or(EvalError::UnboundValue(value.id()))
}

fn unsupported(op: &Operation) -> EvalError {
    EvalError::UnsupportedOp { op: op.name().to_string(), location: op.loc.clone() }
}

fn mismatch(op: &Operation, expected: &str, found: String) -> EvalError {
    EvalError::TypeMismatch {
        op: op.name().to_string(),
        expected: expected.to_string(),
        found,
        location: op.loc.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Visibility};

    fn rng_module(elem: IntType, shape: Vec<u64>) -> Module {
        let mut module = Module::new("test");
        let (func, args) = module.add_function("main", vec![Type::int(64)], None).unwrap();
        let mut b = Builder::at_end(&mut module, Some(func)).unwrap();
        let r = b.rng_get_and_update_state(args[0], Type::tensor(shape, elem)).unwrap();
        b.ret(vec![r]).unwrap();
        module
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xFF, 8, 16), 0xFFFF);
        assert_eq!(sign_extend(0x7F, 8, 16), 0x7F);
        assert_eq!(sign_extend(u64::MAX as u128, 64, 128), u128::MAX);
        assert_eq!(sign_extend(0x1FF, 8, 16), 0xFFFF);
    }

    #[test]
    fn test_pack_chunks() {
        let value = 0x0123_4567_89AB_CDEF_FEDC_BA98_7654_3210u128;
        assert_eq!(pack_chunks(value, 32, 4), vec![0x0123_4567, 0x89AB_CDEF, 0xFEDC_BA98, 0x7654_3210]);
        assert_eq!(pack_chunks(value, 64, 1), vec![0xFEDC_BA98_7654_3210]);
        assert!(pack_chunks(value, 8, 0).is_empty());
    }

    #[test]
    fn test_abstract_op_creates_counter_lazily() {
        let module = rng_module(IntType::unsigned(32), vec![4]);
        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.global("rng_state"), None);

        let first = interp.call_ints("main", &[10]).unwrap();
        assert_eq!(first[0].as_elems().unwrap(), &[0, 0, 0, 0x7012395]);
        assert_eq!(interp.global("rng_state"), Some(0x7012395 + 10));

        let second = interp.call_ints("main", &[1]).unwrap();
        assert_eq!(second[0].as_elems().unwrap(), &[0, 0, 0, 0x7012395 + 10]);
        assert_eq!(interp.global("rng_state"), Some(0x7012395 + 11));
    }

    #[test]
    fn test_counter_wraps() {
        let module = rng_module(IntType::signless(64), vec![2]);
        let mut interp = Interpreter::new(&module);
        interp.call_ints("main", &[0]).unwrap();
        interp.set_global("rng_state", u128::MAX).unwrap();
        let out = interp.call_ints("main", &[5]).unwrap();
        assert_eq!(out[0].as_elems().unwrap(), &[u64::MAX as u128, u64::MAX as u128]);
        assert_eq!(interp.global("rng_state"), Some(4));
    }

    #[test]
    fn test_lowered_ops() {
        let mut module = Module::new("test");
        let elem = IntType::signless(128);
        Builder::at_module_start(&mut module).global("cell", elem, 0xAB, Visibility::Private).unwrap();
        let (func, args) = module.add_function("f", vec![Type::Int(IntType::signed(8))], None).unwrap();
        let mut b = Builder::at_end(&mut module, Some(func)).unwrap();
        let cell = b.get_global("cell", Type::memref(elem)).unwrap();
        let old = b.load(cell).unwrap();
        let wide = b.extsi(args[0], elem).unwrap();
        let new = b.addi(old, wide).unwrap();
        b.store(new, cell).unwrap();
        let four = b.constant(4, elem).unwrap();
        let hi = b.shrui(old, four).unwrap();
        let hi = b.trunci(hi, IntType::signless(8)).unwrap();
        let lo = b.trunci(old, IntType::signless(8)).unwrap();
        let t = b.from_elements(vec![hi, lo], Type::tensor(vec![2], IntType::signless(8))).unwrap();
        let t = b.unrealized_cast(t, Type::tensor(vec![2], IntType::unsigned(8))).unwrap();
        b.ret(vec![t]).unwrap();

        let mut interp = Interpreter::new(&module);
        let out = interp.call_ints("f", &[0xFF]).unwrap(); // -1
        assert_eq!(out[0].as_elems().unwrap(), &[0x0A, 0xAB]);
        assert_eq!(interp.global("cell"), Some(0xAA));
        assert_eq!(out[0].to_string(), "[10, 171] : tensor<2xui8>");
    }

    #[test]
    fn test_oversized_shapes_are_rejected() {
        let module = rng_module(IntType::signless(32), vec![5]);
        let mut interp = Interpreter::new(&module);
        let err = interp.call_ints("main", &[1]).unwrap_err();
        assert_eq!(err.to_string(), "cannot pack 5 x 32-bit elements from a 128-bit counter");
        // The failed call leaves no counter behind.
        assert_eq!(interp.global("rng_state"), None);

        let module = rng_module(IntType::signless(32), vec![1 << 32, 1 << 32]);
        let err = Interpreter::new(&module).call_ints("main", &[1]).unwrap_err();
        assert!(matches!(
            err,
            EvalError::PackedWidthOverflow { elements: u64::MAX, word_size: 32, counter_bits: 128, .. }
        ));

        let module = rng_module(IntType::signless(0), vec![1 << 40]);
        let err = Interpreter::new(&module).call_ints("main", &[1]).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_zero_element_result() {
        let module = rng_module(IntType::signless(32), vec![0]);
        let mut interp = Interpreter::new(&module);
        let out = interp.call_ints("main", &[3]).unwrap();
        assert!(out[0].as_elems().unwrap().is_empty());
        assert_eq!(interp.global("rng_state"), Some(0x7012395 + 3));
    }

    #[test]
    fn test_errors() {
        let module = rng_module(IntType::unsigned(32), vec![4]);
        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call_ints("nope", &[]), Err(EvalError::UnknownFunction("nope".into())));
        assert_eq!(
            interp.call_ints("main", &[]),
            Err(EvalError::ArityMismatch { func: "main".into(), expected: 1, got: 0 })
        );
        assert_eq!(interp.set_global("other", 1), Err(EvalError::MissingGlobal("other".into())));

        let mut module = Module::new("test");
        let (func, _) = module.add_function("g", vec![], None).unwrap();
        let mut b = Builder::at_end(&mut module, Some(func)).unwrap();
        b.opaque("test.effect", vec![], vec![]).unwrap();
        let err = Interpreter::new(&module).call_ints("g", &[]).unwrap_err();
        assert_eq!(err.to_string(), "cannot evaluate 'test.effect'");
    }
}

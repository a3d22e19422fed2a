//! Arena-backed IR.
//!
//! # Structure
//!
//! ```text
//! Module (symbol table)
//! ├── memref.global @rng_state ...
//! └── func.func @main(...)
//!     └── ops (single block)
//! ```
//!
//! Operations live in an arena indexed by [`OpId`]; regions are ordered
//! lists of ids. Erasing an op frees its slot but never renumbers others, so
//! ids held by a worklist stay meaningful across rewrites (an erased id
//! simply resolves to `None`).

mod builder;
mod op;
mod types;
mod value;

pub use builder::Builder;
pub use op::{dialect_of, global_cell, Attr, OpId, OpKind, Operation, Visibility};
pub use types::{mask_for_bits, IntType, Signedness, Type, MAX_INT_BITS};
pub use value::{ValueDef, ValueId, ValueInfo};

/// Op name constants.
pub mod names {
    pub use super::op::{
        ADDI, CONSTANT, EXTSI, EXTUI, FROM_ELEMENTS, FUNC, GET_GLOBAL, GLOBAL, LOAD,
        RETURN, RNG_GET_AND_UPDATE_STATE, SHRUI, STORE, TRUNCI, UNREALIZED_CAST,
    };
}

use crate::debug::SourceLoc;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Structural IR errors (dangling ids, malformed insertion points).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IrError {
    #[error("operation {0} has been erased or never existed")]
    DeadOp(OpId),

    #[error("value {0} is not defined in this module")]
    UnknownValue(ValueId),

    #[error("operation {0} is not a function")]
    NotAFunction(OpId),
}

pub type IrResult<T> = Result<T, IrError>;

/// An IR module: the top-level symbol table and owner of every op and value.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Op arena; `None` marks an erased slot
    ops: Vec<Option<Operation>>,
    /// Value table indexed by `ValueId`
    values: Vec<ValueInfo>,
    /// Top-level region
    body: Vec<OpId>,
}

impl Module {
    /// Create a new empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
            values: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Get an operation by id.
    pub fn op(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Get a mutable operation by id.
    pub fn op_mut(&mut self, id: OpId) -> Option<&mut Operation> {
        self.ops.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    /// Is the op still part of the module?
    pub fn is_live(&self, id: OpId) -> bool {
        self.op(id).is_some()
    }

    /// Get value information.
    pub fn value(&self, value: ValueId) -> Option<&ValueInfo> {
        self.values.get(value.index())
    }

    /// Get the type of a value.
    pub fn value_type(&self, value: ValueId) -> IrResult<&Type> {
        self.value(value)
            .map(|info| &info.ty)
            .ok_or(IrError::UnknownValue(value))
    }

    /// Number of values ever created.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Top-level ops in order.
    pub fn body(&self) -> &[OpId] {
        &self.body
    }

    /// Ops of a region (`None` is the module body).
    pub fn region(&self, parent: Option<OpId>) -> IrResult<&[OpId]> {
        match parent {
            None => Ok(&self.body),
            Some(p) => self.op(p).map(|op| op.region.as_slice()).ok_or(IrError::DeadOp(p)),
        }
    }

    fn region_mut(&mut self, parent: Option<OpId>) -> IrResult<&mut Vec<OpId>> {
        match parent {
            None => Ok(&mut self.body),
            Some(p) => self.op_mut(p).map(|op| &mut op.region).ok_or(IrError::DeadOp(p)),
        }
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId::new(self.values.len() as u32);
        self.values.push(ValueInfo { ty, def });
        id
    }

    /// Insert `op` into a region at `index` (clamped to the region length),
    /// allocating one result value per entry of `result_types`.
    pub fn insert_op(
        &mut self,
        parent: Option<OpId>,
        index: usize,
        mut op: Operation,
        result_types: Vec<Type>,
    ) -> IrResult<OpId> {
        // Validate the insertion point before touching the arena.
        let len = self.region(parent)?.len();

        let id = OpId(self.ops.len() as u32);
        op.parent = parent;
        op.results = result_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| self.new_value(ty, ValueDef::Result { op: id, index }))
            .collect();
        self.ops.push(Some(op));

        self.region_mut(parent)?.insert(index.min(len), id);
        Ok(id)
    }

    /// Append `op` at the end of a region.
    pub fn push_op(&mut self, parent: Option<OpId>, op: Operation, result_types: Vec<Type>) -> IrResult<OpId> {
        self.insert_op(parent, usize::MAX, op, result_types)
    }

    /// Add a function with the given parameter types at the end of the module.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        arg_types: Vec<Type>,
        loc: Option<SourceLoc>,
    ) -> IrResult<(OpId, Vec<ValueId>)> {
        let func = self.push_op(None, Operation::new(OpKind::Func { sym: name.into() }).at(loc), Vec::new())?;
        let args: Vec<ValueId> = arg_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| self.new_value(ty, ValueDef::Arg { func, index }))
            .collect();
        self.op_mut(func).ok_or(IrError::DeadOp(func))?.args = args.clone();
        Ok((func, args))
    }

    /// Region and index holding an op.
    pub fn position(&self, id: OpId) -> Option<(Option<OpId>, usize)> {
        let parent = self.op(id)?.parent;
        let index = self.region(parent).ok()?.iter().position(|&o| o == id)?;
        Some((parent, index))
    }

    /// Remove an op (and anything nested in it) from the module.
    pub fn erase_op(&mut self, id: OpId) -> IrResult<Operation> {
        let parent = self.op(id).ok_or(IrError::DeadOp(id))?.parent;
        self.region_mut(parent)?.retain(|&o| o != id);

        let op = self.ops[id.index()].take().ok_or(IrError::DeadOp(id))?;
        for &child in &op.region {
            // Children are detached together with their parent.
            self.erase_detached(child);
        }
        Ok(op)
    }

    fn erase_detached(&mut self, id: OpId) {
        if let Some(op) = self.ops.get_mut(id.index()).and_then(|slot| slot.take()) {
            for child in op.region {
                self.erase_detached(child);
            }
        }
    }

    /// Replace every result of `id` with the matching value of `values`, then
    /// erase the op.
    pub fn replace_op(&mut self, id: OpId, values: &[ValueId]) -> IrResult<()> {
        let results = self.op(id).ok_or(IrError::DeadOp(id))?.results.clone();
        for (&from, &to) in results.iter().zip(values) {
            self.replace_all_uses(from, to);
        }
        self.erase_op(id)?;
        Ok(())
    }

    /// Arena high-water mark. Ops created later have ids at or above it.
    pub fn arena_len(&self) -> usize {
        self.ops.len()
    }

    /// Live ops created since `mark` (see [`Module::arena_len`]).
    pub fn ops_created_since(&self, mark: usize) -> Vec<OpId> {
        (mark..self.ops.len())
            .map(|i| OpId(i as u32))
            .filter(|&id| self.is_live(id))
            .collect()
    }

    /// Rewrite every use of `from` into a use of `to`. Returns the number of
    /// operands changed.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        let mut replaced = 0;
        for op in self.ops.iter_mut().flatten() {
            for operand in op.operands.iter_mut() {
                if *operand == from {
                    *operand = to;
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// Ops using a value.
    pub fn uses(&self, value: ValueId) -> Vec<OpId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.op(id).map(|op| op.uses_value(value)).unwrap_or(false))
            .collect()
    }

    /// All live ops in pre-order, in program order.
    pub fn walk(&self) -> Vec<OpId> {
        let mut order = Vec::new();
        self.walk_region(&self.body, &mut order);
        order
    }

    fn walk_region(&self, region: &[OpId], order: &mut Vec<OpId>) {
        for &id in region {
            if let Some(op) = self.op(id) {
                order.push(id);
                self.walk_region(&op.region, order);
            }
        }
    }

    /// Find a symbol definition in the module symbol table.
    pub fn lookup_symbol(&self, name: &str) -> Option<OpId> {
        self.body.iter().copied().find(|&id| {
            self.op(id)
                .map(|op| op.kind.defines_symbol() && op.kind.symbol() == Some(name))
                .unwrap_or(false)
        })
    }

    /// Get a function by name.
    pub fn function(&self, name: &str) -> Option<OpId> {
        self.lookup_symbol(name)
            .filter(|&id| matches!(self.op(id).map(|op| &op.kind), Some(OpKind::Func { .. })))
    }

    /// Iterate over function names and ids.
    pub fn functions(&self) -> impl Iterator<Item = (&str, OpId)> + '_ {
        self.body.iter().filter_map(move |&id| match self.op(id).map(|op| &op.kind) {
            Some(OpKind::Func { sym }) => Some((sym.as_str(), id)),
            _ => None,
        })
    }

    /// Count live ops with the given name.
    pub fn count_ops(&self, name: &str) -> usize {
        self.walk()
            .into_iter()
            .filter(|&id| self.op(id).map(|op| op.name() == name).unwrap_or(false))
            .count()
    }

    /// Number of live ops.
    pub fn num_ops(&self) -> usize {
        self.ops.iter().flatten().count()
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new("module")
    }
}

// =============================================================================
// Printer
// =============================================================================

/// Values are renumbered in definition order so that printing is stable
/// across parse/print round trips regardless of arena gaps.
struct Printer<'m> {
    module: &'m Module,
    names: HashMap<ValueId, usize>,
}

impl<'m> Printer<'m> {
    fn name(&mut self, value: ValueId) -> String {
        let next = self.names.len();
        let n = *self.names.entry(value).or_insert(next);
        format!("%{}", n)
    }

    fn use_name(&self, value: ValueId) -> String {
        match self.names.get(&value) {
            Some(n) => format!("%{}", n),
            None => format!("%<undef:{}>", value.id()),
        }
    }

    fn region(&mut self, f: &mut fmt::Formatter<'_>, region: &[OpId], depth: usize) -> fmt::Result {
        let module = self.module;
        for &id in region {
            if let Some(op) = module.op(id) {
                self.op(f, op, depth)?;
            }
        }
        Ok(())
    }

    fn op(&mut self, f: &mut fmt::Formatter<'_>, op: &'m Operation, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);

        if let OpKind::Func { sym } = &op.kind {
            let args: Vec<String> = op
                .args
                .iter()
                .map(|&a| {
                    let ty = self.module.value(a).map(|info| info.ty.to_string()).unwrap_or_default();
                    format!("{}: {}", self.name(a), ty)
                })
                .collect();
            writeln!(f, "{}{} @{}({}) {{", indent, op.name(), sym, args.join(", "))?;
            self.region(f, &op.region, depth + 1)?;
            return writeln!(f, "{}}}", indent);
        }

        write!(f, "{}", indent)?;
        if !op.results.is_empty() {
            let results: Vec<String> = op.results.iter().map(|&r| self.name(r)).collect();
            write!(f, "{} = ", results.join(", "))?;
        }
        write!(f, "{}", op.name())?;
        if let Some(sym) = op.kind.symbol() {
            write!(f, " @{}", sym)?;
        }
        if !op.operands.is_empty() {
            let operands: Vec<String> = op.operands.iter().map(|&v| self.use_name(v)).collect();
            write!(f, " {}", operands.join(", "))?;
        }

        let attrs = op.kind.attrs();
        if !attrs.is_empty() {
            let attrs: Vec<String> = attrs
                .iter()
                .map(|(key, attr)| match attr {
                    Attr::Unit => key.clone(),
                    _ => format!("{} = {}", key, attr),
                })
                .collect();
            write!(f, " {{{}}}", attrs.join(", "))?;
        }

        if let OpKind::Global { ty, .. } = &op.kind {
            write!(f, " : {}", ty)?;
        } else if !op.results.is_empty() {
            let types: Vec<String> = op
                .results
                .iter()
                .map(|&r| self.module.value(r).map(|info| info.ty.to_string()).unwrap_or_default())
                .collect();
            write!(f, " : {}", types.join(", "))?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer { module: self, names: HashMap::new() };
        writeln!(f, "module @{} {{", self.name)?;
        printer.region(f, &self.body, 1)?;
        writeln!(f, "}}")
    }
}

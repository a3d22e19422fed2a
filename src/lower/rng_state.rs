//! Lowering of `mhlo.rng_get_and_update_state`.
//!
//! ```text
//! %r = mhlo.rng_get_and_update_state %delta : tensor<4xui32>
//! ```
//!
//! becomes
//!
//! ```text
//! %cell = memref.get_global @rng_state : memref<i128>
//! %old  = memref.load %cell : i128
//! %d    = arith.extui %delta : i128          // only if narrower
//! %new  = arith.addi %old, %d : i128
//! memref.store %new, %cell
//! %c96  = arith.constant {value = 96} : i128
//! %s96  = arith.shrui %old, %c96 : i128
//! %e0   = arith.trunci %s96 : i32
//! ...                                        // 64, 32, 0
//! %t    = tensor.from_elements %e0, %e1, %e2, %e3 : tensor<4xi32>
//! %r'   = builtin.unrealized_conversion_cast %t : tensor<4xui32>
//! ```
//!
//! The op yields the counter value from *before* the update, split into
//! `wordSize`-bit chunks with the most significant chunk first. The packed
//! tensor is built with signless elements and cast back to the declared type;
//! resolving that cast is left to a later pass.
//!
//! # Concurrency
//!
//! The emitted load/add/store sequence is not atomic. If the lowered code
//! runs on several threads sharing one module's counter, two callers can read
//! the same old value or lose an increment. No synchronization is emitted;
//! callers of the generated code must serialize access themselves.

use super::counter::get_or_create;
use crate::config::LowerConfig;
use crate::debug::SourceLoc;
use crate::ir::{names, Builder, IntType, IrError, Module, OpId, OpKind, Type, ValueId};
use crate::legalize::{LegalizeError, RewritePattern};

/// Rewrites the abstract RNG state op into arithmetic on a counter cell.
#[derive(Debug, Clone)]
pub struct RngGetAndUpdateStatePattern {
    symbol: String,
    counter_bits: u32,
    seed: u128,
}

/// Operands and result shape of a well-formed op.
struct Parts {
    delta: ValueId,
    delta_ty: IntType,
    shape: Vec<u64>,
    elem: IntType,
    result_ty: Type,
}

impl RngGetAndUpdateStatePattern {
    /// Create the pattern for a configuration.
    pub fn new(config: &LowerConfig) -> Self {
        Self {
            symbol: config.state_symbol.clone(),
            counter_bits: config.counter_bits,
            seed: config.seed,
        }
    }

    /// Check the input contract without touching the IR.
    fn inspect(&self, module: &Module, id: OpId) -> Result<Parts, LegalizeError> {
        let op = module.op(id).ok_or(IrError::DeadOp(id))?;
        let loc: Option<SourceLoc> = op.loc.clone();
        let malformed = |reason: String| LegalizeError::malformed(op.name(), reason, loc.clone());

        if op.operands.len() != 1 {
            return Err(malformed(format!("expected 1 operand, got {}", op.operands.len())));
        }
        if op.results.len() != 1 {
            return Err(malformed(format!("expected 1 result, got {}", op.results.len())));
        }
        let delta = op.operands[0];
        let delta_ty = match module.value_type(delta)? {
            Type::Int(ty) => *ty,
            other => return Err(malformed(format!("delta must be an integer, got {}", other))),
        };
        if !delta_ty.is_valid() {
            return Err(malformed(format!("delta has invalid integer type {}", delta_ty)));
        }
        if delta_ty.bits > self.counter_bits {
            return Err(malformed(format!(
                "delta of type {} is wider than the {}-bit counter",
                delta_ty, self.counter_bits
            )));
        }

        let result_ty = module.value_type(op.results[0])?.clone();
        let (shape, elem) = match &result_ty {
            Type::Tensor { shape, elem } => (shape.clone(), *elem),
            other => return Err(malformed(format!("result must be a tensor, got {}", other))),
        };

        if !elem.is_valid() {
            return Err(malformed(format!("result has invalid element type {}", elem)));
        }
        let fits = result_ty
            .packed_bits()
            .map(|total| total <= self.counter_bits as u64)
            .unwrap_or(false);
        if !fits {
            return Err(LegalizeError::PackedWidthOverflow {
                elements: result_ty.num_elements(),
                word_size: elem.bits,
                counter_bits: self.counter_bits,
                location: loc,
            });
        }

        Ok(Parts { delta, delta_ty, shape, elem, result_ty })
    }
}

impl RewritePattern for RngGetAndUpdateStatePattern {
    fn name(&self) -> &'static str {
        "rng-get-and-update-state-to-arith"
    }

    fn root(&self) -> &'static str {
        names::RNG_GET_AND_UPDATE_STATE
    }

    fn matches(&self, module: &Module, op: OpId) -> bool {
        matches!(module.op(op).map(|o| &o.kind), Some(OpKind::RngGetAndUpdateState))
    }

    fn rewrite(&self, module: &mut Module, id: OpId) -> Result<(), LegalizeError> {
        let parts = self.inspect(module, id)?;
        let counter = get_or_create(module, id, &self.symbol, self.counter_bits, self.seed)?;
        let wide = counter.elem();

        let result = {
            let mut b = Builder::before(module, id)?;

            // Read, bump, write back.
            let cell = b.get_global(&counter.symbol, counter.ty.clone())?;
            let old = b.load(cell)?;
            let delta = if parts.delta_ty.bits == wide.bits {
                parts.delta
            } else if parts.delta_ty.is_signed() {
                b.extsi(parts.delta, wide)?
            } else {
                b.extui(parts.delta, wide)?
            };
            let new = b.addi(old, delta)?;
            b.store(new, cell)?;

            // Pack the old value, most significant chunk first.
            let word = IntType::signless(parts.elem.bits);
            let count = parts.shape.iter().product::<u64>();
            let mut chunks = Vec::with_capacity(count as usize);
            for i in (0..count).rev() {
                let amount = b.constant(i as u128 * word.bits as u128, wide)?;
                let shifted = b.shrui(old, amount)?;
                chunks.push(b.trunci(shifted, word)?);
            }

            let packed = b.from_elements(chunks, Type::tensor(parts.shape.clone(), word))?;
            b.unrealized_cast(packed, parts.result_ty.clone())?
        };

        module.replace_op(id, &[result])?;
        Ok(())
    }
}

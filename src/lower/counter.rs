//! Module-scoped counter cells.
//!
//! A counter is a private, mutable `memref.global` holding a single integer.
//! Every lowered call site in a module shares the same cell, so the lookup is
//! idempotent: the first call creates the cell at the start of the module
//! body, later calls find it there.

use crate::ir::{Builder, IntType, Module, OpId, OpKind, Type, Visibility};
use crate::legalize::LegalizeError;

/// Non-owning reference to a counter cell.
///
/// Valid as long as the defining op is not erased; the module owns the cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterHandle {
    /// Symbol of the cell
    pub symbol: String,
    /// Cell type (`memref<iW>`)
    pub ty: Type,
    /// Defining `memref.global`
    pub def: OpId,
}

impl CounterHandle {
    /// Integer type stored in the cell.
    pub fn elem(&self) -> IntType {
        self.ty.element_type()
    }
}

fn describe_symbol(kind: &OpKind) -> String {
    match kind {
        OpKind::Global { ty, constant: true, .. } => format!("a constant '{}' of type {}", kind.name(), ty),
        OpKind::Global { ty, .. } => format!("'{}' of type {}", kind.name(), ty),
        _ => format!("'{}'", kind.name()),
    }
}

/// Find the counter cell `name` in the module enclosing `anchor`, creating it
/// with `seed` if it does not exist yet.
///
/// An existing symbol with that name must be a mutable `memref.global` of
/// type `memref<i{width}>`; anything else is a
/// [`LegalizeError::SymbolKindMismatch`]. New cells take the location of
/// `anchor`.
pub fn get_or_create(
    module: &mut Module,
    anchor: OpId,
    name: &str,
    width: u32,
    seed: u128,
) -> Result<CounterHandle, LegalizeError> {
    let anchor_loc = module.op(anchor).and_then(|op| op.loc.clone());
    let elem = IntType::signless(width);
    let expected = Type::memref(elem);

    if let Some(def) = module.lookup_symbol(name) {
        let op = module.op(def).ok_or(crate::ir::IrError::DeadOp(def))?;
        return match &op.kind {
            OpKind::Global { ty, constant: false, .. } if *ty == expected => {
                log::trace!("Reusing counter cell @{} ({})", name, def);
                Ok(CounterHandle { symbol: name.to_string(), ty: expected, def })
            }
            other => Err(LegalizeError::SymbolKindMismatch {
                symbol: name.to_string(),
                found: describe_symbol(other),
                expected: expected.to_string(),
                location: op.loc.clone().or(anchor_loc),
            }),
        };
    }

    let def = Builder::at_module_start(module)
        .with_loc(anchor_loc)
        .global(name, elem, seed, Visibility::Private)?;
    log::debug!("Created counter cell @{} : {} (seed {:#x})", name, expected, seed);
    Ok(CounterHandle { symbol: name.to_string(), ty: expected, def })
}

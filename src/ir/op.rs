//! Operations.
//!
//! Operation kinds form a closed enum. Anything the crate does not know
//! about is carried as [`OpKind::Opaque`] so it survives a parse/print
//! round trip, but no rule or evaluator ever looks inside it.
//!
//! Op names follow `dialect.op`; the dialect prefix is what a conversion
//! target marks legal or illegal wholesale.

use super::types::{IntType, Type};
use super::value::ValueId;
use crate::debug::SourceLoc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation identifier (index into the module arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl OpId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Symbol visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible outside the module
    Public,
    /// Module-local, not externally linkable
    Private,
}

impl Visibility {
    /// Parse from the textual attribute value.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }

    /// Textual attribute value.
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// A generic attribute value, used when printing and for opaque ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    /// Integer literal
    Int(u128),
    /// Quoted string
    Str(String),
    /// Presence-only flag
    Unit,
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Int(v) => write!(f, "{}", v),
            Attr::Str(s) => write!(f, "\"{}\"", s),
            Attr::Unit => Ok(()),
        }
    }
}

// Op names
pub const CONSTANT: &str = "arith.constant";
pub const ADDI: &str = "arith.addi";
pub const SHRUI: &str = "arith.shrui";
pub const TRUNCI: &str = "arith.trunci";
pub const EXTUI: &str = "arith.extui";
pub const EXTSI: &str = "arith.extsi";
pub const GLOBAL: &str = "memref.global";
pub const GET_GLOBAL: &str = "memref.get_global";
pub const LOAD: &str = "memref.load";
pub const STORE: &str = "memref.store";
pub const FROM_ELEMENTS: &str = "tensor.from_elements";
pub const UNREALIZED_CAST: &str = "builtin.unrealized_conversion_cast";
pub const FUNC: &str = "func.func";
pub const RETURN: &str = "func.return";
pub const RNG_GET_AND_UPDATE_STATE: &str = "mhlo.rng_get_and_update_state";

/// Operation kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// `arith.constant`: integer literal of the result type
    Constant { value: u128 },
    /// `arith.addi`: wrapping addition
    AddI,
    /// `arith.shrui`: logical shift right
    ShRUI,
    /// `arith.trunci`: keep the low bits
    TruncI,
    /// `arith.extui`: zero extension
    ExtUI,
    /// `arith.extsi`: sign extension
    ExtSI,
    /// `memref.global`: module-level storage cell definition
    Global {
        sym: String,
        ty: Type,
        init: u128,
        visibility: Visibility,
        constant: bool,
    },
    /// `memref.get_global`: reference to a global cell
    GetGlobal { sym: String },
    /// `memref.load`
    Load,
    /// `memref.store value, memref`
    Store,
    /// `tensor.from_elements`: pack scalars into a tensor, row-major
    FromElements,
    /// `builtin.unrealized_conversion_cast`: type still to be reconciled
    UnrealizedCast,
    /// `func.func`: function definition with a single-block body
    Func { sym: String },
    /// `func.return`
    Return,
    /// `mhlo.rng_get_and_update_state delta`: read RNG state, bump it
    RngGetAndUpdateState,
    /// Any other op, carried through untouched
    Opaque {
        name: String,
        sym: Option<String>,
        attrs: Vec<(String, Attr)>,
    },
}

impl OpKind {
    /// Full op name (`dialect.op`).
    pub fn name(&self) -> &str {
        match self {
            OpKind::Constant { .. } => CONSTANT,
            OpKind::AddI => ADDI,
            OpKind::ShRUI => SHRUI,
            OpKind::TruncI => TRUNCI,
            OpKind::ExtUI => EXTUI,
            OpKind::ExtSI => EXTSI,
            OpKind::Global { .. } => GLOBAL,
            OpKind::GetGlobal { .. } => GET_GLOBAL,
            OpKind::Load => LOAD,
            OpKind::Store => STORE,
            OpKind::FromElements => FROM_ELEMENTS,
            OpKind::UnrealizedCast => UNREALIZED_CAST,
            OpKind::Func { .. } => FUNC,
            OpKind::Return => RETURN,
            OpKind::RngGetAndUpdateState => RNG_GET_AND_UPDATE_STATE,
            OpKind::Opaque { name, .. } => name,
        }
    }

    /// Dialect prefix of the op name.
    pub fn dialect(&self) -> &str {
        dialect_of(self.name())
    }

    /// Symbol printed after the op name, if any (definitions and references).
    pub fn symbol(&self) -> Option<&str> {
        match self {
            OpKind::Global { sym, .. } | OpKind::GetGlobal { sym } | OpKind::Func { sym } => Some(sym),
            OpKind::Opaque { sym, .. } => sym.as_deref(),
            _ => None,
        }
    }

    /// Does this op define the symbol it names?
    pub fn defines_symbol(&self) -> bool {
        match self {
            OpKind::Global { .. } | OpKind::Func { .. } => true,
            OpKind::Opaque { sym, .. } => sym.is_some(),
            _ => false,
        }
    }

    /// Attributes in print order.
    pub fn attrs(&self) -> Vec<(String, Attr)> {
        match self {
            OpKind::Constant { value } => vec![("value".to_string(), Attr::Int(*value))],
            OpKind::Global { init, visibility, constant, .. } => {
                let mut attrs = vec![
                    ("visibility".to_string(), Attr::Str(visibility.as_str().to_string())),
                    ("init".to_string(), Attr::Int(*init)),
                ];
                if *constant {
                    attrs.push(("constant".to_string(), Attr::Unit));
                }
                attrs
            }
            OpKind::Opaque { attrs, .. } => attrs.clone(),
            _ => Vec::new(),
        }
    }

    /// Can the op be removed when its results are unused?
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            OpKind::Store | OpKind::Return | OpKind::RngGetAndUpdateState | OpKind::Opaque { .. }
        )
    }

    /// Is this an arithmetic op?
    pub fn is_arith(&self) -> bool {
        self.dialect() == "arith"
    }
}

/// Dialect prefix of an op name (`arith.addi` -> `arith`).
pub fn dialect_of(name: &str) -> &str {
    name.split_once('.').map(|(dialect, _)| dialect).unwrap_or(name)
}

/// An operation in the module arena.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Kind and kind-specific attributes
    pub kind: OpKind,
    /// Operand values
    pub operands: Vec<ValueId>,
    /// Result values
    pub results: Vec<ValueId>,
    /// Nested ops (function bodies only)
    pub region: Vec<OpId>,
    /// Region arguments (function parameters)
    pub args: Vec<ValueId>,
    /// Enclosing op, or `None` for the module body
    pub parent: Option<OpId>,
    /// Source location
    pub loc: Option<SourceLoc>,
}

impl Operation {
    /// Create a detached operation without results.
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            operands: Vec::new(),
            results: Vec::new(),
            region: Vec::new(),
            args: Vec::new(),
            parent: None,
            loc: None,
        }
    }

    /// Set operands.
    pub fn operands(mut self, operands: impl Into<Vec<ValueId>>) -> Self {
        self.operands = operands.into();
        self
    }

    /// Set source location.
    pub fn at(mut self, loc: Option<SourceLoc>) -> Self {
        self.loc = loc;
        self
    }

    /// Op name.
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// First result, if any.
    pub fn result(&self) -> Option<ValueId> {
        self.results.first().copied()
    }

    /// Does this op use the given value?
    pub fn uses_value(&self, value: ValueId) -> bool {
        self.operands.contains(&value)
    }
}

/// Build a `memref.global` kind for an integer cell.
pub fn global_cell(sym: impl Into<String>, elem: IntType, init: u128, visibility: Visibility) -> OpKind {
    OpKind::Global {
        sym: sym.into(),
        ty: Type::memref(elem),
        init,
        visibility,
        constant: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_dialects() {
        assert_eq!(OpKind::AddI.name(), "arith.addi");
        assert_eq!(OpKind::AddI.dialect(), "arith");
        assert_eq!(OpKind::RngGetAndUpdateState.dialect(), "mhlo");
        assert_eq!(OpKind::UnrealizedCast.dialect(), "builtin");
        assert_eq!(dialect_of("noprefix"), "noprefix");

        let opaque = OpKind::Opaque { name: "mhlo.add".into(), sym: None, attrs: vec![] };
        assert_eq!(opaque.name(), "mhlo.add");
        assert_eq!(opaque.dialect(), "mhlo");
    }

    #[test]
    fn test_symbols() {
        let global = global_cell("rng_state", IntType::signless(128), 5, Visibility::Private);
        assert_eq!(global.symbol(), Some("rng_state"));
        assert!(global.defines_symbol());

        let get = OpKind::GetGlobal { sym: "rng_state".into() };
        assert_eq!(get.symbol(), Some("rng_state"));
        assert!(!get.defines_symbol());

        assert!(OpKind::Func { sym: "main".into() }.defines_symbol());
        assert!(!OpKind::Load.defines_symbol());
    }

    #[test]
    fn test_global_attrs() {
        let global = global_cell("rng_state", IntType::signless(128), 0x7012395, Visibility::Private);
        let attrs = global.attrs();
        assert_eq!(attrs[0], ("visibility".to_string(), Attr::Str("private".into())));
        assert_eq!(attrs[1], ("init".to_string(), Attr::Int(0x7012395)));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_side_effects() {
        assert!(OpKind::Store.has_side_effects());
        assert!(OpKind::RngGetAndUpdateState.has_side_effects());
        assert!(!OpKind::AddI.has_side_effects());
        assert!(!OpKind::Load.has_side_effects());
    }
}

//! SSA values.
//!
//! Every value is defined exactly once, either as an op result or as a
//! function argument, and carries its type.

use super::op::OpId;
use super::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SSA value identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    /// Create a new value id.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id.
    pub fn id(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// The `index`-th result of an operation
    Result { op: OpId, index: usize },
    /// The `index`-th argument of a function
    Arg { func: OpId, index: usize },
}

/// Per-value bookkeeping kept by the module.
#[derive(Debug, Clone)]
pub struct ValueInfo {
    /// Value type
    pub ty: Type,
    /// Defining op or function
    pub def: ValueDef,
}

//! Pattern-driven legalization.
//!
//! A [`ConversionTarget`] says which ops are acceptable output, a
//! [`PatternSet`] holds the rewrite rules keyed by the op they apply to, and
//! [`apply_conversion`] drives the rules over a module until nothing illegal
//! is left or no rule can make progress.
//!
//! # Error Handling
//!
//! Rules report structured [`LegalizeError`]s. Some are fatal (the module is
//! malformed in a way a rule cannot work around) and abort the run at once;
//! [`LegalizeError::NonConvergence`] is reported after the driver has done
//! everything it can, and leaves the already-applied rewrites in place.

mod driver;
mod pattern;
mod target;

pub use driver::{apply_conversion, ConversionMode, ConversionReport};
pub use pattern::{PatternSet, RewritePattern};
pub use target::{ConversionTarget, Legality};

use crate::config::ConfigError;
use crate::debug::{format_with_loc, SourceLoc};
use crate::ir::{IrError, OpId};
use std::fmt;
use thiserror::Error;

/// An op the driver could not legalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalOp {
    /// Arena id
    pub id: OpId,
    /// Op name
    pub name: String,
    /// Source location, if known
    pub location: Option<SourceLoc>,
}

impl fmt::Display for IllegalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_with_loc(&self.location, &format!("'{}' ({})", self.name, self.id)))
    }
}

fn join_ops(ops: &[IllegalOp]) -> String {
    ops.iter().map(|op| op.to_string()).collect::<Vec<_>>().join(", ")
}

/// Errors raised while legalizing a module.
#[derive(Error, Debug)]
pub enum LegalizeError {
    /// A symbol with the counter's name exists but is not a counter cell.
    #[error("{}", format_with_loc(.location, &format!("symbol '{}' is already defined as {}, not as a {} counter cell", .symbol, .found, .expected)))]
    SymbolKindMismatch {
        symbol: String,
        found: String,
        expected: String,
        location: Option<SourceLoc>,
    },

    /// Illegal ops remain and no rule can make progress on them.
    #[error("failed to legalize {} operation(s) after {} rewrite(s): {}", .remaining.len(), .applied, join_ops(.remaining))]
    NonConvergence {
        remaining: Vec<IllegalOp>,
        applied: usize,
    },

    /// The requested output shape needs more bits than the counter holds.
    #[error("{}", format_with_loc(.location, &format!("cannot pack {} x {}-bit elements from a {}-bit counter", .elements, .word_size, .counter_bits)))]
    PackedWidthOverflow {
        elements: u64,
        word_size: u32,
        counter_bits: u32,
        location: Option<SourceLoc>,
    },

    /// The op does not satisfy its input contract.
    #[error("{}", format_with_loc(.location, &format!("malformed '{}': {}", .op, .reason)))]
    MalformedOp {
        op: String,
        reason: String,
        location: Option<SourceLoc>,
    },

    /// Invalid pass configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Structural IR error (dangling op or value).
    #[error("IR error: {0}")]
    Ir(#[from] IrError),
}

impl LegalizeError {
    /// Create a MalformedOp error.
    pub fn malformed(op: impl Into<String>, reason: impl Into<String>, loc: Option<SourceLoc>) -> Self {
        Self::MalformedOp { op: op.into(), reason: reason.into(), location: loc }
    }

    /// Should the host abort compilation outright?
    ///
    /// Non-convergence is left to the caller; everything else means the
    /// module or configuration is broken.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LegalizeError::NonConvergence { .. })
    }
}

//! Source locations for IR operations.
//!
//! Operations parsed from text remember where they came from, and ops created
//! by a rewrite inherit the location of the op they replace. Diagnostics use
//! these to point back at the offending line.

use serde::{Deserialize, Serialize};

/// Source location information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    /// Source file path (or a pseudo-name such as `<input>`)
    pub file: String,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl SourceLoc {
    /// Create a new source location.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Create an unknown location.
    pub fn unknown() -> Self {
        Self::new(String::new(), 0, 0)
    }

    /// Check if this is an unknown/invalid location.
    pub fn is_unknown(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else if self.file.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

/// Prefix a diagnostic message with a location, if one is known.
pub fn format_with_loc(loc: &Option<SourceLoc>, msg: &str) -> String {
    match loc {
        Some(loc) if !loc.is_unknown() => format!("{}: {}", loc, msg),
        _ => msg.to_string(),
    }
}

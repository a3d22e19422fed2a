//! Textual IR parser
//!
//! Reads the format produced by `Display for Module`:
//!
//! ```text
//! module @example {
//!   memref.global @rng_state {visibility = "private", init = 117515157} : memref<i128>
//!   func.func @main(%0: i64) {
//!     %1 = mhlo.rng_get_and_update_state %0 : tensor<4xui32>
//!     func.return %1
//!   }
//! }
//! ```
//!
//! One op per line. Ops the crate does not model are kept as opaque ops.

pub mod lexer;
pub mod parser;

pub use parser::{parse, parse_named, parse_type};

use crate::ir::IrError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Lexer error at line {line}: {message}")]
    LexerError { line: usize, message: String },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Invalid type at line {line}: {text}")]
    InvalidType { line: usize, text: String },

    #[error("Use of undefined value %{name} at line {line}")]
    UndefinedValue { line: usize, name: String },

    #[error("Redefinition of value %{name} at line {line}")]
    Redefinition { line: usize, name: String },

    #[error("IR error: {0}")]
    Ir(#[from] IrError),
}

impl ParseError {
    /// Line the error was found on, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::LexerError { line, .. }
            | ParseError::ParseError { line, .. }
            | ParseError::InvalidType { line, .. }
            | ParseError::UndefinedValue { line, .. }
            | ParseError::Redefinition { line, .. } => Some(*line),
            ParseError::UnexpectedEof | ParseError::Ir(_) => None,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

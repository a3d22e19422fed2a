//! Legalization of HLO RNG state updates into arithmetic primitives.
//!
//! This crate rewrites `mhlo.rng_get_and_update_state` into loads, adds,
//! stores, shifts and truncations over a module-scoped 128-bit counter
//! cell, driven by a legality-based pattern rewriter. It carries a small
//! MLIR-like IR with a textual format and a reference evaluator so the
//! lowering can be checked end to end.

pub mod config;
pub mod debug;
pub mod interp;
pub mod ir;
pub mod legalize;
pub mod lower;
pub mod parser;
pub mod stats;

pub use config::{ConfigError, LowerConfig};
pub use interp::{EvalError, Interpreter, RtValue};
pub use ir::Module;
pub use legalize::{ConversionMode, LegalizeError};
pub use lower::{arithmetic_target, legalize_to_arithmetic, populate_arithmetic_patterns};
pub use stats::LegalizeStats;

use anyhow::{Context, Result};
use std::path::Path;

/// Parse textual IR and lower it.
pub fn lower_source(source: &str, config: &LowerConfig) -> Result<(Module, LegalizeStats)> {
    let mut module = parser::parse(source).context("Failed to parse module")?;
    let stats = legalize_to_arithmetic(&mut module, config).context("Failed to legalize module")?;
    Ok((module, stats))
}

/// Read, parse and lower a textual IR file.
pub fn lower_file(path: &Path, config: &LowerConfig) -> Result<(Module, LegalizeStats)> {
    let source = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file = path.display().to_string();
    let mut module = parser::parse_named(&source, &file).with_context(|| format!("Failed to parse {}", file))?;
    let stats = legalize_to_arithmetic(&mut module, config).with_context(|| format!("Failed to legalize {}", file))?;
    Ok((module, stats))
}

/// Evaluate `entry` `calls` times on one interpreter, returning each call's
/// results and the final counter value.
pub fn run_function(
    module: &Module,
    config: &LowerConfig,
    entry: &str,
    args: &[u128],
    calls: usize,
) -> Result<(Vec<Vec<RtValue>>, Option<u128>)> {
    let mut interp = Interpreter::with_config(module, config);
    let mut outputs = Vec::with_capacity(calls);
    for i in 0..calls {
        let out = interp
            .call_ints(entry, args)
            .with_context(|| format!("Call {} of @{} failed", i + 1, entry))?;
        outputs.push(out);
    }
    Ok((outputs, interp.global(&config.state_symbol)))
}

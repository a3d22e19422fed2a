//! Lowering to the arithmetic dialects.
//!
//! Builds the conversion target and pattern set for lowering stateful HLO
//! ops to `arith`/`memref`/`tensor`, and runs them over a module.
//!
//! # Error Handling
//!
//! The configuration is validated before anything is touched. Rule errors
//! ([`LegalizeError::SymbolKindMismatch`], [`LegalizeError::PackedWidthOverflow`],
//! [`LegalizeError::MalformedOp`]) abort the run; if illegal ops remain the
//! run ends with [`LegalizeError::NonConvergence`]. In both cases rewrites
//! already applied stay in the module.

mod counter;
mod rng_state;

pub use counter::{get_or_create, CounterHandle};
pub use rng_state::RngGetAndUpdateStatePattern;

use crate::config::LowerConfig;
use crate::ir::{names, Module};
use crate::legalize::{apply_conversion, ConversionTarget, LegalizeError, Legality, PatternSet};
use crate::stats::{count_functions, LegalizeStats, Timer};

/// Dialects accepted in lowered output.
pub const LEGAL_DIALECTS: &[&str] = &["arith", "memref", "tensor", "builtin", "func"];

/// Conversion target for the arithmetic lowering.
pub fn arithmetic_target() -> ConversionTarget {
    let mut target = ConversionTarget::new();
    for dialect in LEGAL_DIALECTS {
        target.add_legal_dialect(dialect);
    }
    target.add_illegal_op(names::RNG_GET_AND_UPDATE_STATE);
    target
}

/// Register the arithmetic lowering patterns.
pub fn populate_arithmetic_patterns(patterns: &mut PatternSet, config: &LowerConfig) {
    patterns.add(Box::new(RngGetAndUpdateStatePattern::new(config)));
}

/// Lower every `mhlo.rng_get_and_update_state` in `module`.
pub fn legalize_to_arithmetic(module: &mut Module, config: &LowerConfig) -> Result<LegalizeStats, LegalizeError> {
    config.validate()?;

    let mut stats = LegalizeStats::new();
    stats.num_functions = count_functions(module);
    stats.ops_before = module.num_ops();
    let had_counter = module.lookup_symbol(&config.state_symbol).is_some();

    let target = arithmetic_target();
    let mut patterns = PatternSet::new();
    populate_arithmetic_patterns(&mut patterns, config);

    let timer = Timer::start();
    let report = apply_conversion(module, &target, &patterns, config.mode)?;
    stats.elapsed = timer.stop();

    stats.record(&report);
    stats.ops_after = module.num_ops();
    stats.remaining_illegal = module
        .walk()
        .into_iter()
        .filter_map(|id| module.op(id))
        .filter(|op| target.legality(op.name()) != Legality::Legal)
        .count();
    if !had_counter && module.lookup_symbol(&config.state_symbol).is_some() {
        stats.globals_created = 1;
    }
    Ok(stats)
}

//! Worklist-driven conversion.
//!
//! The driver never walks the IR while mutating it. It snapshots the ops that
//! need conversion into a worklist of arena ids, and each rewrite reports new
//! ops through the arena high-water mark. Ids of erased ops resolve to
//! nothing and are skipped.
//!
//! Ops that fail to convert are retried in another round as long as the
//! previous round made progress, since a later rewrite may enable an earlier
//! pattern. A round without progress ends the run.

use super::pattern::PatternSet;
use super::target::{ConversionTarget, Legality};
use super::{IllegalOp, LegalizeError};
use crate::ir::{Module, OpId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How strictly ops of unknown legality are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionMode {
    /// Every op not marked legal must be converted.
    #[default]
    Full,
    /// Only ops marked illegal must be converted; unknown ops are left alone.
    Partial,
}

impl ConversionMode {
    /// Does an op of the given legality need converting in this mode?
    pub fn needs_conversion(self, legality: Legality) -> bool {
        match self {
            ConversionMode::Full => legality != Legality::Legal,
            ConversionMode::Partial => legality == Legality::Illegal,
        }
    }
}

impl std::fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionMode::Full => write!(f, "full"),
            ConversionMode::Partial => write!(f, "partial"),
        }
    }
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Rewrites applied
    pub rewrites: usize,
    /// Ops created by rewrites
    pub ops_created: usize,
    /// Ops replaced or erased by rewrites
    pub ops_erased: usize,
    /// Worklist rounds run
    pub rounds: usize,
}

fn needs_conversion(module: &Module, target: &ConversionTarget, mode: ConversionMode, id: OpId) -> bool {
    module
        .op(id)
        .map(|op| mode.needs_conversion(target.legality(op.name())))
        .unwrap_or(false)
}

fn describe(module: &Module, id: OpId) -> Option<IllegalOp> {
    module.op(id).map(|op| IllegalOp {
        id,
        name: op.name().to_string(),
        location: op.loc.clone(),
    })
}

/// Convert every op that `target` does not accept, using `patterns`.
///
/// Fatal rule errors abort immediately. If illegal ops remain once no rule
/// can make progress, returns [`LegalizeError::NonConvergence`]; rewrites
/// applied up to that point are kept.
pub fn apply_conversion(
    module: &mut Module,
    target: &ConversionTarget,
    patterns: &PatternSet,
    mode: ConversionMode,
) -> Result<ConversionReport, LegalizeError> {
    let mut report = ConversionReport::default();
    let mut worklist: VecDeque<OpId> = module
        .walk()
        .into_iter()
        .filter(|&id| needs_conversion(module, target, mode, id))
        .collect();

    log::debug!("Legalizing module '{}': {} op(s) on the worklist ({} mode)", module.name, worklist.len(), mode);

    loop {
        report.rounds += 1;
        let mut progress = false;
        let mut pending: Vec<OpId> = Vec::new();

        while let Some(id) = worklist.pop_front() {
            let name = match module.op(id) {
                Some(op) => op.name().to_string(),
                None => continue, // erased by an earlier rewrite
            };
            log::trace!("Visiting {} '{}'", id, name);

            let mark = module.arena_len();
            let mut converted = false;
            for pattern in patterns.patterns_for(&name) {
                if !pattern.matches(module, id) {
                    continue;
                }
                pattern.rewrite(module, id)?;
                log::debug!("Pattern '{}' rewrote '{}' ({})", pattern.name(), name, id);
                converted = true;
                break;
            }

            if !converted {
                pending.push(id);
                continue;
            }

            progress = true;
            report.rewrites += 1;
            if module.is_live(id) {
                // The rule left its root behind; retry it with everything else.
                pending.push(id);
            } else {
                report.ops_erased += 1;
            }

            for new_op in module.ops_created_since(mark) {
                report.ops_created += 1;
                if needs_conversion(module, target, mode, new_op) {
                    worklist.push_back(new_op);
                }
            }
        }

        pending.retain(|&id| needs_conversion(module, target, mode, id));
        if pending.is_empty() {
            log::debug!(
                "Legalized module '{}': {} rewrite(s), {} op(s) created",
                module.name, report.rewrites, report.ops_created
            );
            return Ok(report);
        }

        if !progress {
            let remaining: Vec<IllegalOp> = pending.iter().filter_map(|&id| describe(module, id)).collect();
            log::warn!(
                "Failed to legalize {} op(s) in module '{}'",
                remaining.len(),
                module.name
            );
            return Err(LegalizeError::NonConvergence { remaining, applied: report.rewrites });
        }

        worklist = pending.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, IntType, Type};
    use crate::legalize::RewritePattern;

    /// Rewrites `test.double %x` into `arith.addi %x, %x`.
    struct DoubleToAdd;

    impl RewritePattern for DoubleToAdd {
        fn name(&self) -> &'static str {
            "double-to-add"
        }
        fn root(&self) -> &'static str {
            "test.double"
        }
        fn matches(&self, _module: &Module, _op: OpId) -> bool {
            true
        }
        fn rewrite(&self, module: &mut Module, op: OpId) -> Result<(), LegalizeError> {
            let operand = module.op(op).map(|o| o.operands[0]).ok_or(crate::ir::IrError::DeadOp(op))?;
            let sum = {
                let mut b = Builder::before(module, op)?;
                b.addi(operand, operand)?
            };
            module.replace_op(op, &[sum])?;
            Ok(())
        }
    }

    /// Rewrites `test.quad %x` into two `test.double`s.
    struct QuadToDoubles;

    impl RewritePattern for QuadToDoubles {
        fn name(&self) -> &'static str {
            "quad-to-doubles"
        }
        fn root(&self) -> &'static str {
            "test.quad"
        }
        fn matches(&self, _module: &Module, _op: OpId) -> bool {
            true
        }
        fn rewrite(&self, module: &mut Module, op: OpId) -> Result<(), LegalizeError> {
            let operand = module.op(op).map(|o| o.operands[0]).ok_or(crate::ir::IrError::DeadOp(op))?;
            let ty = module.value_type(operand)?.clone();
            let result = {
                let mut b = Builder::before(module, op)?;
                let first = b.opaque("test.double", vec![operand], vec![ty.clone()])?;
                let first = b.module().op(first).and_then(|o| o.result()).ok_or(crate::ir::IrError::DeadOp(first))?;
                let second = b.opaque("test.double", vec![first], vec![ty])?;
                b.module().op(second).and_then(|o| o.result()).ok_or(crate::ir::IrError::DeadOp(second))?
            };
            module.replace_op(op, &[result])?;
            Ok(())
        }
    }

    fn arith_target() -> ConversionTarget {
        let mut target = ConversionTarget::new();
        target.add_legal_dialect("arith").add_legal_dialect("func");
        target
    }

    fn module_with(ops: &[&str]) -> Module {
        let mut module = Module::new("test");
        let (func, args) = module.add_function("main", vec![Type::int(32)], None).unwrap();
        let mut b = Builder::at_end(&mut module, Some(func)).unwrap();
        let mut value = args[0];
        for name in ops {
            let id = b.opaque(name, vec![value], vec![Type::Int(IntType::signless(32))]).unwrap();
            value = b.module().op(id).unwrap().result().unwrap();
        }
        b.ret(vec![value]).unwrap();
        module
    }

    #[test]
    fn test_converges_through_new_illegal_ops() {
        let mut module = module_with(&["test.quad", "test.double"]);
        let mut patterns = PatternSet::new();
        patterns.add(Box::new(QuadToDoubles));
        patterns.add(Box::new(DoubleToAdd));

        let report = apply_conversion(&mut module, &arith_target(), &patterns, ConversionMode::Full).unwrap();
        assert_eq!(report.rewrites, 4); // quad, then three doubles
        assert_eq!(module.count_ops("arith.addi"), 3);
        assert_eq!(module.count_ops("test.double"), 0);
        assert_eq!(module.count_ops("test.quad"), 0);
    }

    #[test]
    fn test_unknown_op_fails_in_full_mode() {
        let mut module = module_with(&["test.double", "test.mystery"]);
        let mut patterns = PatternSet::new();
        patterns.add(Box::new(DoubleToAdd));

        let err = apply_conversion(&mut module, &arith_target(), &patterns, ConversionMode::Full).unwrap_err();
        match err {
            LegalizeError::NonConvergence { remaining, applied } => {
                assert_eq!(remaining.len(), 1);
                assert_eq!(remaining[0].name, "test.mystery");
                assert_eq!(applied, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Applied rewrites are not rolled back.
        assert_eq!(module.count_ops("arith.addi"), 1);
    }

    #[test]
    fn test_unknown_op_tolerated_in_partial_mode() {
        let mut module = module_with(&["test.double", "test.mystery"]);
        let mut target = arith_target();
        target.add_illegal_op("test.double");
        let mut patterns = PatternSet::new();
        patterns.add(Box::new(DoubleToAdd));

        let report = apply_conversion(&mut module, &target, &patterns, ConversionMode::Partial).unwrap();
        assert_eq!(report.rewrites, 1);
        assert_eq!(module.count_ops("test.mystery"), 1);
    }

    #[test]
    fn test_legal_module_is_untouched() {
        let mut module = module_with(&[]);
        let before = module.to_string();
        let report =
            apply_conversion(&mut module, &arith_target(), &PatternSet::new(), ConversionMode::Full).unwrap();
        assert_eq!(report.rewrites, 0);
        assert_eq!(report.rounds, 1);
        assert_eq!(module.to_string(), before);
    }

    #[test]
    fn test_mode_classification() {
        assert!(ConversionMode::Full.needs_conversion(Legality::Unknown));
        assert!(ConversionMode::Full.needs_conversion(Legality::Illegal));
        assert!(!ConversionMode::Full.needs_conversion(Legality::Legal));
        assert!(!ConversionMode::Partial.needs_conversion(Legality::Unknown));
        assert!(ConversionMode::Partial.needs_conversion(Legality::Illegal));
    }

    #[test]
    fn test_rewrite_error_aborts() {
        struct Broken;
        impl RewritePattern for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn root(&self) -> &'static str {
                "test.double"
            }
            fn matches(&self, _module: &Module, _op: OpId) -> bool {
                true
            }
            fn rewrite(&self, _module: &mut Module, _op: OpId) -> Result<(), LegalizeError> {
                Err(LegalizeError::malformed("test.double", "always broken", None))
            }
        }

        let mut module = module_with(&["test.double"]);
        let mut patterns = PatternSet::new();
        patterns.add(Box::new(Broken));
        let err = apply_conversion(&mut module, &arith_target(), &patterns, ConversionMode::Full).unwrap_err();
        assert!(err.is_fatal());
    }
}

//! Rewrite patterns and the per-op registry that holds them.

use super::LegalizeError;
use crate::ir::{Module, OpId};
use indexmap::IndexMap;

/// A rewrite rule rooted at one op kind.
pub trait RewritePattern {
    /// Name of the pattern for debugging.
    fn name(&self) -> &'static str;

    /// Op name this pattern applies to.
    fn root(&self) -> &'static str;

    /// Rule-specific predicate, checked after the kind matches.
    fn matches(&self, module: &Module, op: OpId) -> bool;

    /// Rewrite `op`. On success the op must have been replaced or erased.
    fn rewrite(&self, module: &mut Module, op: OpId) -> Result<(), LegalizeError>;
}

/// Patterns grouped by root op, each group in registration order.
#[derive(Default)]
pub struct PatternSet {
    by_root: IndexMap<&'static str, Vec<Box<dyn RewritePattern>>>,
}

impl PatternSet {
    /// Create an empty pattern set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern.
    pub fn add(&mut self, pattern: Box<dyn RewritePattern>) {
        self.by_root.entry(pattern.root()).or_default().push(pattern);
    }

    /// Candidate patterns for an op name, in registration order.
    pub fn patterns_for(&self, name: &str) -> &[Box<dyn RewritePattern>] {
        self.by_root.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Total number of registered patterns.
    pub fn len(&self) -> usize {
        self.by_root.values().map(|v| v.len()).sum()
    }

    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    impl RewritePattern for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        fn root(&self) -> &'static str {
            self.1
        }
        fn matches(&self, _module: &Module, _op: OpId) -> bool {
            false
        }
        fn rewrite(&self, _module: &mut Module, _op: OpId) -> Result<(), LegalizeError> {
            Ok(())
        }
    }

    #[test]
    fn test_patterns_grouped_by_root() {
        let mut set = PatternSet::new();
        assert!(set.is_empty());
        set.add(Box::new(Named("a", "mhlo.add")));
        set.add(Box::new(Named("b", "mhlo.mul")));
        set.add(Box::new(Named("c", "mhlo.add")));

        assert_eq!(set.len(), 3);
        let names: Vec<&str> = set.patterns_for("mhlo.add").iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(set.patterns_for("arith.addi").is_empty());
    }
}

//! Conversion targets: which ops are acceptable output.

use indexmap::IndexMap;

/// Legality of an op kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Legality {
    /// Accepted as-is and never revisited
    Legal,
    /// Must be rewritten
    Illegal,
    /// Neither marked legal nor illegal
    Unknown,
}

/// Set of legal and illegal op kinds and dialects.
///
/// Op-level entries take precedence over dialect-level ones. The target is
/// configured before a run and only read during it.
#[derive(Debug, Clone, Default)]
pub struct ConversionTarget {
    dialects: IndexMap<String, Legality>,
    ops: IndexMap<String, Legality>,
}

impl ConversionTarget {
    /// Create an empty target (everything unknown).
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every op of a dialect legal.
    pub fn add_legal_dialect(&mut self, dialect: &str) -> &mut Self {
        self.dialects.insert(dialect.to_string(), Legality::Legal);
        self
    }

    /// Mark every op of a dialect illegal.
    pub fn add_illegal_dialect(&mut self, dialect: &str) -> &mut Self {
        self.dialects.insert(dialect.to_string(), Legality::Illegal);
        self
    }

    /// Mark a single op legal.
    pub fn add_legal_op(&mut self, name: &str) -> &mut Self {
        self.ops.insert(name.to_string(), Legality::Legal);
        self
    }

    /// Mark a single op illegal.
    pub fn add_illegal_op(&mut self, name: &str) -> &mut Self {
        self.ops.insert(name.to_string(), Legality::Illegal);
        self
    }

    /// Classify an op by name.
    pub fn legality(&self, name: &str) -> Legality {
        if let Some(&legality) = self.ops.get(name) {
            return legality;
        }
        self.dialects
            .get(crate::ir::dialect_of(name))
            .copied()
            .unwrap_or(Legality::Unknown)
    }

    /// Legal dialect names, in registration order.
    pub fn legal_dialects(&self) -> impl Iterator<Item = &str> {
        self.dialects
            .iter()
            .filter(|(_, &l)| l == Legality::Legal)
            .map(|(d, _)| d.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_overrides_dialect() {
        let mut target = ConversionTarget::new();
        target.add_legal_dialect("arith").add_illegal_op("arith.addi");
        assert_eq!(target.legality("arith.addi"), Legality::Illegal);
        assert_eq!(target.legality("arith.constant"), Legality::Legal);
        assert_eq!(target.legality("mhlo.add"), Legality::Unknown);
    }

    #[test]
    fn test_illegal_dialect() {
        let mut target = ConversionTarget::new();
        target.add_illegal_dialect("mhlo").add_legal_op("mhlo.constant");
        assert_eq!(target.legality("mhlo.add"), Legality::Illegal);
        assert_eq!(target.legality("mhlo.constant"), Legality::Legal);
    }

    #[test]
    fn test_legal_dialects_listing() {
        let mut target = ConversionTarget::new();
        target.add_legal_dialect("arith").add_illegal_dialect("mhlo").add_legal_dialect("memref");
        let dialects: Vec<&str> = target.legal_dialects().collect();
        assert_eq!(dialects, vec!["arith", "memref"]);
    }
}

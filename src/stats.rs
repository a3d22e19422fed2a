//! Legalization statistics.
//!
//! Tracks metrics during a run for verbose output.

use crate::ir::Module;
use crate::legalize::ConversionReport;
use std::time::{Duration, Instant};

/// Legalization statistics.
#[derive(Debug, Default, Clone)]
pub struct LegalizeStats {
    /// Time spent in the driver
    pub elapsed: Duration,

    /// Number of functions
    pub num_functions: usize,
    /// Ops before the run
    pub ops_before: usize,
    /// Ops after the run
    pub ops_after: usize,
    /// Rewrites applied
    pub rewrites: usize,
    /// Ops created by rewrites
    pub ops_created: usize,
    /// Ops erased by rewrites
    pub ops_erased: usize,
    /// Counter cells created
    pub globals_created: usize,
    /// Ops outside the legal set left in place (only non-zero in partial mode)
    pub remaining_illegal: usize,
    /// Worklist rounds
    pub rounds: usize,
}

impl LegalizeStats {
    /// Create a new stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in the driver's counters.
    pub fn record(&mut self, report: &ConversionReport) {
        self.rewrites = report.rewrites;
        self.ops_created = report.ops_created;
        self.ops_erased = report.ops_erased;
        self.rounds = report.rounds;
    }

    /// Display statistics.
    pub fn display(&self) {
        eprintln!("\n=== Legalization Statistics ===");
        eprintln!("Functions:       {}", self.num_functions);
        eprintln!("Operations:      {} → {}", self.ops_before, self.ops_after);
        eprintln!("Rewrites:        {}", self.rewrites);
        eprintln!("Ops created:     {}", self.ops_created);
        eprintln!("Ops erased:      {}", self.ops_erased);
        eprintln!("Globals created: {}", self.globals_created);
        eprintln!("Still illegal:   {}", self.remaining_illegal);
        eprintln!("Rounds:          {}", self.rounds);
        eprintln!();
        eprintln!("=== Timing ===");
        eprintln!("Total:           {:?}", self.elapsed);
    }
}

/// Timer helper for measuring phase durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Stop the timer and return elapsed duration.
    pub fn stop(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Count live ops with a given name.
pub fn count_ops(module: &Module, name: &str) -> usize {
    module.count_ops(name)
}

/// Count functions in a module.
pub fn count_functions(module: &Module) -> usize {
    module.functions().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Type};

    #[test]
    fn test_legalize_stats_default() {
        let stats = LegalizeStats::new();
        assert_eq!(stats.rewrites, 0);
        assert_eq!(stats.ops_before, 0);
        assert_eq!(stats.globals_created, 0);
    }

    #[test]
    fn test_record_report() {
        let mut stats = LegalizeStats::new();
        stats.record(&ConversionReport { rewrites: 2, ops_created: 30, ops_erased: 2, rounds: 1 });
        assert_eq!(stats.rewrites, 2);
        assert_eq!(stats.ops_created, 30);
        assert_eq!(stats.ops_erased, 2);
        assert_eq!(stats.rounds, 1);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.stop();
        assert!(elapsed >= std::time::Duration::from_millis(10));
    }

    #[test]
    fn test_count_ops() {
        let mut module = Module::new("test");
        let (func, args) = module.add_function("main", vec![Type::int(64)], None).unwrap();
        let mut b = Builder::at_end(&mut module, Some(func)).unwrap();
        let sum = b.addi(args[0], args[0]).unwrap();
        let sum = b.addi(sum, args[0]).unwrap();
        b.ret(vec![sum]).unwrap();

        assert_eq!(count_ops(&module, "arith.addi"), 2);
        assert_eq!(count_ops(&module, "func.return"), 1);
        assert_eq!(count_functions(&module), 1);
    }
}

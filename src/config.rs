//! Configuration for the arithmetic lowering.
//!
//! The defaults reproduce the canonical lowering: a 128-bit counter named
//! `rng_state` seeded with `0x7012395`, converted in full mode.

use crate::ir::{mask_for_bits, MAX_INT_BITS};
use crate::legalize::ConversionMode;
use serde::{Deserialize, Serialize};

/// Name of the counter cell.
pub const DEFAULT_STATE_SYMBOL: &str = "rng_state";

/// Width of the counter cell in bits.
pub const DEFAULT_COUNTER_BITS: u32 = 128;

/// Initial value of a freshly created counter cell.
pub const DEFAULT_SEED: u128 = 0x7012395;

/// Lowering configuration.
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `state_symbol` | `rng_state` | symbol of the counter cell |
/// | `counter_bits` | 128 | counter width W |
/// | `seed` | `0x7012395` | initial counter value |
/// | `mode` | `Full` | how unknown ops are treated |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerConfig {
    /// Symbol of the module-scoped counter cell
    pub state_symbol: String,

    /// Counter width in bits (1-128)
    pub counter_bits: u32,

    /// Initial value of the counter cell
    pub seed: u128,

    /// Conversion mode for the driver
    pub mode: ConversionMode,
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self {
            state_symbol: DEFAULT_STATE_SYMBOL.to_string(),
            counter_bits: DEFAULT_COUNTER_BITS,
            seed: DEFAULT_SEED,
            mode: ConversionMode::Full,
        }
    }
}

impl LowerConfig {
    /// Set the counter symbol.
    pub fn with_state_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.state_symbol = symbol.into();
        self
    }

    /// Set the initial counter value.
    pub fn with_seed(mut self, seed: u128) -> Self {
        self.seed = seed;
        self
    }

    /// Set the counter width.
    pub fn with_counter_bits(mut self, bits: u32) -> Self {
        self.counter_bits = bits;
        self
    }

    /// Set the conversion mode.
    pub fn with_mode(mut self, mode: ConversionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check the configuration before a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_symbol.is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if self.counter_bits == 0 || self.counter_bits > MAX_INT_BITS {
            return Err(ConfigError::InvalidCounterBits(self.counter_bits));
        }
        if self.seed & !mask_for_bits(self.counter_bits) != 0 {
            return Err(ConfigError::SeedTooWide { seed: self.seed, bits: self.counter_bits });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("state_symbol must not be empty")]
    EmptySymbol,

    #[error("counter_bits must be 1-128, got {0}")]
    InvalidCounterBits(u32),

    #[error("seed {seed:#x} does not fit in {bits} bits")]
    SeedTooWide { seed: u128, bits: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LowerConfig::default();
        assert_eq!(config.state_symbol, "rng_state");
        assert_eq!(config.counter_bits, 128);
        assert_eq!(config.seed, 0x7012395);
        assert_eq!(config.mode, ConversionMode::Full);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let config = LowerConfig::default().with_state_symbol("");
        assert_eq!(config.validate(), Err(ConfigError::EmptySymbol));

        let config = LowerConfig::default().with_counter_bits(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidCounterBits(0)));

        let config = LowerConfig::default().with_counter_bits(256);
        assert_eq!(config.validate(), Err(ConfigError::InvalidCounterBits(256)));

        let config = LowerConfig::default().with_counter_bits(16).with_seed(0x10000);
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "seed 0x10000 does not fit in 16 bits");
    }

    #[test]
    fn test_narrow_counter_with_fitting_seed() {
        let config = LowerConfig::default().with_counter_bits(64).with_seed(u64::MAX as u128);
        assert!(config.validate().is_ok());
    }
}

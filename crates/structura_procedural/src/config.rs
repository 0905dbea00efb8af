//! # Configuration
//!
//! Search limits, cache sizing and worker count, loadable from TOML.
//!
//! ```toml
//! [generator]
//! max_expansion_count = 10000
//! max_stack_depth = 2000
//! cache_capacity = 67108864
//!
//! [pool]
//! threads = 4
//! ```
//!
//! Every key is optional; missing keys take the [`Default`] values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::{ConfigError, ConfigResult};

/// Limits of one structure search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Expansion attempts after which the search gives up.
    pub max_expansion_count: u32,
    /// Checkpoint depth after which the search gives up.
    pub max_stack_depth: usize,
    /// Value cache capacity in bytes, per worker.
    pub cache_capacity: usize,
    /// Value cache eviction tuning.
    pub eviction: EvictionPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_expansion_count: 10_000,
            max_stack_depth: 2_000,
            cache_capacity: 64 << 20,
            eviction: EvictionPolicy::default(),
        }
    }
}

impl GeneratorConfig {
    /// Server preset: larger grammars, bigger cache.
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_expansion_count: 50_000,
            max_stack_depth: 5_000,
            cache_capacity: 256 << 20,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Worker pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Fixed worker count; derived from the machine when `None`.
    pub threads: Option<usize>,
    /// Upper bound of the derived worker count.
    pub max_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: None,
            max_threads: 4,
        }
    }
}

impl PoolConfig {
    /// Worker count to spawn.
    ///
    /// Without an override this leaves two cores free for the caller:
    /// `min(available - 2, max_threads)`, at least one.
    #[must_use]
    pub fn resolved_threads(&self) -> usize {
        if let Some(threads) = self.threads {
            return threads.max(1);
        }
        let available = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        available.saturating_sub(2).min(self.max_threads).max(1)
    }
}

/// Complete engine configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuraConfig {
    /// Search limits and cache.
    pub generator: GeneratorConfig,
    /// Worker pool.
    pub pool: PoolConfig,
}

impl StructuraConfig {
    /// Server preset.
    #[must_use]
    pub fn production() -> Self {
        Self {
            generator: GeneratorConfig::production(),
            pool: PoolConfig {
                threads: None,
                max_threads: 16,
            },
        }
    }

    /// Parses and validates TOML.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or nonsensical values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        let g = &self.generator;
        if g.max_expansion_count == 0 {
            return Err(ConfigError::Invalid("generator.max_expansion_count must be positive".into()));
        }
        if g.max_stack_depth == 0 {
            return Err(ConfigError::Invalid("generator.max_stack_depth must be positive".into()));
        }
        if g.eviction.sample_count == 0 {
            return Err(ConfigError::Invalid("generator.eviction.sample_count must be positive".into()));
        }
        if g.eviction.staleness_weight.is_nan() || g.eviction.staleness_weight < 0.0 {
            return Err(ConfigError::Invalid("generator.eviction.staleness_weight must be >= 0".into()));
        }
        if self.pool.threads == Some(0) || self.pool.max_threads == 0 {
            return Err(ConfigError::Invalid("pool thread counts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = StructuraConfig::from_toml_str("").expect("parse");
        assert_eq!(config, StructuraConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = StructuraConfig::from_toml_str(
            "[generator]\nmax_stack_depth = 12\n[generator.eviction]\nsample_count = 8\n[pool]\nthreads = 3\n",
        )
        .expect("parse");

        assert_eq!(config.generator.max_stack_depth, 12);
        assert_eq!(config.generator.max_expansion_count, 10_000);
        assert_eq!(config.generator.eviction.sample_count, 8);
        assert_eq!(config.pool.resolved_threads(), 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = StructuraConfig::from_toml_str("[generator]\nmax_expansion_count = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = StructuraConfig::from_toml_str("[generator]\nmax_stack_depth = \"deep\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_resolved_threads_bounds() {
        let pool = PoolConfig {
            threads: None,
            max_threads: 2,
        };
        let n = pool.resolved_threads();
        assert!((1..=2).contains(&n));
        assert!(StructuraConfig::production().validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = StructuraConfig::load(Path::new("/nonexistent/structura.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

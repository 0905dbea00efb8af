//! # Generation Error Types
//!
//! A failed search is an ordinary outcome, not a fault: callers may retry with
//! another seed or origin, or skip the placement.

use thiserror::Error;

/// Why `process()` did not find a structure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFailure {
    /// Every expansion was tried and none led to a valid structure.
    #[error("no solution found, tried all possible expansions ({attempts} attempts)")]
    NoSolution {
        /// Expansion attempts made.
        attempts: u32,
    },

    /// The attempt counter reached its limit.
    #[error("maximum expansion count exceeded ({limit})")]
    ExpansionLimit {
        /// Configured limit.
        limit: u32,
    },

    /// The checkpoint stack reached its limit.
    #[error("maximum stack depth exceeded ({limit})")]
    StackDepthLimit {
        /// Configured limit.
        limit: usize,
    },

    /// The search panicked on a broken contract, e.g. in a field provider.
    #[error("structure search panicked")]
    Panicked,
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Could not read the file.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML or wrong field types.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but make no sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors decoding serialized structure output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// Data does not start with the output magic.
    #[error("not a structure output buffer")]
    BadMagic,

    /// Written by a newer format.
    #[error("unsupported output version {0}")]
    UnsupportedVersion(u32),

    /// Ended before a complete record.
    #[error("structure output truncated")]
    Truncated,

    /// LZ4 frame could not be decoded.
    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// Result type for output decoding.
pub type OutputResult<T> = Result<T, OutputError>;

//! Errors raised by the demo harness

use breakwater_core::ConfigError;
use thiserror::Error;

/// Demo harness errors
#[derive(Debug, Error)]
pub enum DemoError {
    /// Configuration could not be read or holds invalid values.
    #[error("configuration error: {0}")]
    Config(String),

    /// The breaker rejected its configuration.
    #[error("invalid breaker configuration")]
    Breaker(#[from] ConfigError),
}

/// Result alias for the demo harness
pub type Result<T> = std::result::Result<T, DemoError>;

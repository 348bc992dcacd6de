//! Error types surfaced by the breaker

use thiserror::Error;

/// Why a protected call did not produce a value.
///
/// The two variants keep rejection and pass-through apart: `CircuitOpen`
/// means the action was never invoked, `Operation` carries the action's own
/// error untouched. `Operation` is transparent, so its `Display` and
/// `source()` are exactly those of the wrapped error.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is not admitting calls right now.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The action ran and failed with this error.
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// `true` when the call was rejected without running the action.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Borrow the action's error, if the action ran.
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen => None,
            Self::Operation(err) => Some(err),
        }
    }

    /// Take the action's error, if the action ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::CircuitOpen => None,
            Self::Operation(err) => Some(err),
        }
    }
}

/// Rejected breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field holds a value the breaker cannot work with.
    #[error("invalid `{field}`: {message}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}

/// Result of a protected call
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Result of building or validating configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

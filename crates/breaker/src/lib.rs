//! Circuit breaker for a single fallible operation.
//!
//! A [`CircuitBreaker`] sits in front of a call that can fail (usually a
//! remote one). While the call keeps failing the breaker stops invoking it
//! and fails fast with [`BreakerError::CircuitOpen`]; once the configured
//! timeout has passed it lets a trial call through and closes again when the
//! call recovers.
//!
//! # States
//!
//! - `Closed`: calls run, consecutive failures are counted. Reaching
//!   `failure_threshold` opens the circuit.
//! - `Open`: calls are rejected without running. The first call attempted
//!   at or after `opened_at + timeout` moves the breaker to `HalfOpen`.
//! - `HalfOpen`: trial calls run. A success closes the circuit (see
//!   [`ClosePolicy`]); a failure reopens it with a fresh timeout.
//!
//! Transitions are lazy: nothing happens on a timer, only when a call is
//! attempted.
//!
//! # Testing
//!
//! The serde shape tests need the `serde` feature:
//! `cargo test -p breakwater-core --all-features`. `cargo test --workspace`
//! enables it too, through the demo crate.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use breakwater_core::{BreakerConfig, CircuitBreaker};
//!
//! # tokio_test::block_on(async {
//! let breaker = CircuitBreaker::new(BreakerConfig::new(3, 2, Duration::from_secs(10))?)?;
//!
//! let body = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("payload") })
//!     .await
//!     .map_err(|err| err.to_string());
//! assert_eq!(body, Ok("payload"));
//! # Ok::<(), breakwater_core::ConfigError>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod state;

pub use breaker::CircuitBreaker;
pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "serde")]
pub use config::duration_millis;
pub use config::{
    BreakerBuilderWithClock, BreakerConfig, BreakerConfigBuilder, ClosePolicy, MAX_TIMEOUT,
};
pub use error::{BreakerError, BreakerResult, ConfigError, ConfigResult};
pub use state::{BreakerStats, CircuitState};

//! Demonstration harness for `breakwater-core`.
//!
//! Calls a simulated, frequently failing request through a circuit breaker
//! on a fixed schedule and logs every outcome, so the breaker can be watched
//! opening, rejecting, half-opening and closing again.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod runner;
pub mod service;

pub use config::DemoConfig;
pub use error::{DemoError, Result};
pub use runner::{drive, run, RunSummary};
pub use service::{FlakyService, RequestFailed};

//! Simulated remote request that fails at a configurable rate

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Failure reported by [`FlakyService::request`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request failed")]
pub struct RequestFailed;

/// Stand-in for a remote dependency
#[derive(Debug)]
pub struct FlakyService {
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl FlakyService {
    /// Service failing with probability `failure_rate`, seeded from the OS.
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate: failure_rate.clamp(0.0, 1.0), rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Reproducible service for tests.
    pub fn with_seed(failure_rate: f64, seed: u64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Perform one simulated request.
    ///
    /// # Errors
    /// Returns [`RequestFailed`] with probability `failure_rate`.
    pub async fn request(&self) -> Result<&'static str, RequestFailed> {
        tracing::debug!("simulated request received");
        let failed = self.rng.lock().gen_bool(self.failure_rate);
        if failed {
            Err(RequestFailed)
        } else {
            Ok("Success")
        }
    }
}

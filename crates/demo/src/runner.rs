//! Periodic caller
//!
//! Fires one protected request per tick and logs what the breaker did with
//! it. Retrying is left to the schedule: a rejected or failed request is
//! simply followed by the next tick.

use std::future::Future;
use std::time::Duration;

use breakwater_core::{BreakerError, CircuitBreaker, Clock};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::DemoConfig;
use crate::error::Result;
use crate::service::FlakyService;

/// Outcome counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests that ran and succeeded.
    pub succeeded: u64,
    /// Requests that ran and failed.
    pub failed: u64,
    /// Requests rejected by the open circuit.
    pub rejected: u64,
}

impl RunSummary {
    /// Every request attempted, admitted or not.
    pub fn attempts(&self) -> u64 {
        self.succeeded + self.failed + self.rejected
    }
}

/// Build the breaker and service from `config` and run until `shutdown`
/// resolves or the iteration limit is reached.
///
/// # Errors
/// Returns `DemoError` if the configuration is invalid.
pub async fn run<S>(config: DemoConfig, shutdown: S) -> Result<RunSummary>
where
    S: Future<Output = ()>,
{
    config.validate()?;
    let breaker = CircuitBreaker::new(config.breaker.clone())?;
    let service = FlakyService::new(config.failure_rate);
    Ok(drive(&breaker, &service, config.interval, config.iterations, shutdown).await)
}

/// Call `service` through `breaker` once per `interval`.
pub async fn drive<C, S>(
    breaker: &CircuitBreaker<C>,
    service: &FlakyService,
    interval: Duration,
    iterations: Option<u64>,
    shutdown: S,
) -> RunSummary
where
    C: Clock,
    S: Future<Output = ()>,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut summary = RunSummary::default();
    loop {
        if iterations.is_some_and(|limit| summary.attempts() >= limit) {
            break;
        }

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {}
        }

        match breaker.execute(|| service.request()).await {
            Ok(body) => {
                summary.succeeded += 1;
                info!(state = %breaker.state(), body, "request succeeded");
            }
            Err(BreakerError::CircuitOpen) => {
                summary.rejected += 1;
                info!(state = %breaker.state(), "request rejected, circuit breaker is open");
            }
            Err(BreakerError::Operation(err)) => {
                summary.failed += 1;
                warn!(state = %breaker.state(), error = %err, "request failed");
            }
        }
    }

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        rejected = summary.rejected,
        "demo run finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use breakwater_core::{BreakerConfig, CircuitState, MockClock};

    use super::*;

    fn never() -> impl Future<Output = ()> {
        std::future::pending()
    }

    /// With every request failing, the breaker trips after the threshold and
    /// rejects the rest while its (mock) timeout never elapses.
    #[tokio::test]
    async fn test_failing_service_trips_breaker() {
        let breaker = CircuitBreaker::with_clock(
            BreakerConfig::new(3, 2, Duration::from_secs(10)).expect("valid config"),
            MockClock::new(),
        )
        .expect("valid breaker");
        let service = FlakyService::with_seed(1.0, 1);

        let summary = drive(&breaker, &service, Duration::from_millis(1), Some(10), never()).await;

        assert_eq!(summary, RunSummary { succeeded: 0, failed: 3, rejected: 7 });
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_healthy_service_stays_closed() {
        let breaker = CircuitBreaker::with_defaults();
        let service = FlakyService::with_seed(0.0, 1);

        let summary = drive(&breaker, &service, Duration::from_millis(1), Some(5), never()).await;

        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.attempts(), 5);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_unbounded_run() {
        let breaker = CircuitBreaker::with_defaults();
        let service = FlakyService::with_seed(0.0, 1);

        let summary = drive(&breaker, &service, Duration::from_secs(3_600), None, async {}).await;

        assert_eq!(summary.attempts(), 0);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let config = DemoConfig { failure_rate: -0.1, ..DemoConfig::default() };
        assert!(run(config, never()).await.is_err());
    }
}

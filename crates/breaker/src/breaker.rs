//! The circuit breaker
//!
//! [`CircuitBreaker`] guards one logical operation. Each call takes the
//! breaker's lock twice, briefly: once to decide admission and once to record
//! the outcome. The protected action itself always runs with the lock
//! released, so a slow remote call never blocks other callers' admission
//! checks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::{BreakerConfig, BreakerConfigBuilder};
use crate::error::{BreakerError, BreakerResult, ConfigResult};
use crate::state::{Admission, BreakerStats, CircuitState, Permit, StateMachine};

/// Circuit breaker protecting a single fallible operation
///
/// Clones share state, so a breaker can be handed to several tasks that all
/// call the same endpoint.
///
/// ```
/// use std::time::Duration;
///
/// use breakwater_core::{BreakerConfig, BreakerError, CircuitBreaker, CircuitState};
///
/// let config = BreakerConfig::new(1, 1, Duration::from_secs(30)).unwrap();
/// let breaker = CircuitBreaker::new(config).unwrap();
///
/// let failed = breaker.call(|| Err::<(), _>(std::io::Error::other("refused")));
/// assert!(matches!(failed, Err(BreakerError::Operation(_))));
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// let rejected = breaker.call(|| Ok::<_, std::io::Error>(()));
/// assert!(matches!(rejected, Err(BreakerError::CircuitOpen)));
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: Arc<BreakerConfig>,
    machine: Arc<Mutex<StateMachine>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &stats.state)
            .field("failure_count", &stats.failure_count)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            machine: Arc::clone(&self.machine),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock.
    ///
    /// # Errors
    /// Returns [`ConfigError`](crate::ConfigError) if `config` is invalid.
    pub fn new(config: BreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a breaker with [`BreakerConfig::default`].
    pub fn with_defaults() -> Self {
        Self::from_parts(BreakerConfig::default(), SystemClock)
    }

    /// Start a configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker reading time from `clock`.
    ///
    /// # Errors
    /// Returns [`ConfigError`](crate::ConfigError) if `config` is invalid.
    pub fn with_clock(config: BreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, clock))
    }

    fn from_parts(config: BreakerConfig, clock: C) -> Self {
        Self {
            config: Arc::new(config),
            machine: Arc::new(Mutex::new(StateMachine::new())),
            clock: Arc::new(clock),
        }
    }

    /// Run an async action under protection.
    ///
    /// Exactly one admission decision is made. If admitted, `action` is
    /// invoked once and its outcome updates the breaker before being handed
    /// back. Nothing is retried.
    ///
    /// If the returned future is dropped while `action` is still pending, no
    /// outcome is recorded.
    ///
    /// # Errors
    /// - [`BreakerError::CircuitOpen`] if the call was rejected; `action` was
    ///   not invoked.
    /// - [`BreakerError::Operation`] carrying the error `action` returned.
    #[instrument(skip_all, fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, action: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.admit()?;

        match action().await {
            Ok(value) => {
                guard.succeeded();
                Ok(value)
            }
            Err(err) => {
                guard.failed();
                Err(BreakerError::Operation(err))
            }
        }
    }

    /// Run a synchronous action under protection.
    ///
    /// Same contract as [`execute`](Self::execute).
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    #[instrument(skip_all, fields(state = %self.state()))]
    pub fn call<F, T, E>(&self, action: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let guard = self.admit()?;

        match action() {
            Ok(value) => {
                guard.succeeded();
                Ok(value)
            }
            Err(err) => {
                guard.failed();
                Err(BreakerError::Operation(err))
            }
        }
    }

    /// Current state.
    ///
    /// An open breaker whose timeout has passed still reports `Open` until
    /// the next call attempt moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.machine.lock().state()
    }

    /// Whether a call made now would be admitted. Does not change state.
    pub fn is_call_permitted(&self) -> bool {
        let now = self.clock.now();
        self.machine.lock().is_call_permitted(&self.config, now)
    }

    /// Snapshot of state and counters.
    pub fn stats(&self) -> BreakerStats {
        self.machine.lock().snapshot()
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Force the breaker back to CLOSED and clear every counter.
    ///
    /// Calls still in flight complete normally and are recorded against the
    /// fresh state.
    pub fn reset(&self) {
        self.machine.lock().reset();
        info!("circuit breaker manually reset to closed state");
    }

    fn admit<E>(&self) -> Result<CallGuard<'_, C>, BreakerError<E>> {
        let now = self.clock.now();
        match self.machine.lock().try_acquire(&self.config, now) {
            Admission::Admitted(permit) => Ok(CallGuard { breaker: self, permit: Some(permit) }),
            Admission::Rejected => Err(BreakerError::CircuitOpen),
        }
    }
}

/// An admitted call whose outcome has not been recorded yet
///
/// Dropping it without an outcome (cancelled future, panicking action) gives
/// back any half-open trial slot and records nothing.
struct CallGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    permit: Option<Permit>,
}

impl<C: Clock> CallGuard<'_, C> {
    fn succeeded(mut self) {
        if let Some(permit) = self.permit.take() {
            let now = self.breaker.clock.now();
            let mut machine = self.breaker.machine.lock();
            machine.release(permit);
            machine.on_success(&self.breaker.config, now);
        }
    }

    fn failed(mut self) {
        if let Some(permit) = self.permit.take() {
            let now = self.breaker.clock.now();
            let mut machine = self.breaker.machine.lock();
            machine.release(permit);
            machine.on_failure(&self.breaker.config, now);
        }
    }
}

impl<C: Clock> Drop for CallGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.machine.lock().release(permit);
            debug!("protected call abandoned before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::clock::MockClock;
    use crate::config::{ClosePolicy, MAX_TIMEOUT};
    use crate::error::ConfigError;

    fn io_err(message: &str) -> std::io::Error {
        std::io::Error::other(message.to_string())
    }

    fn mock_breaker(failure_threshold: u32, timeout: Duration) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::builder()
            .clock(clock.clone())
            .failure_threshold(failure_threshold)
            .timeout(timeout)
            .build()
            .expect("test breaker should build");
        (breaker, clock)
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_call_permitted());
        assert_eq!(breaker.config(), &BreakerConfig::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BreakerConfig { failure_threshold: 0, ..BreakerConfig::default() };
        assert!(CircuitBreaker::new(config).is_err());
    }

    /// A timeout the clock cannot represent is refused up front, so a failing
    /// call can never panic while opening the circuit.
    #[test]
    fn test_unbounded_timeout_is_rejected() {
        assert!(matches!(
            BreakerConfig::new(1, 1, Duration::MAX),
            Err(ConfigError::Invalid { field: "timeout", .. })
        ));

        let config = BreakerConfig { timeout: Duration::MAX, ..BreakerConfig::default() };
        assert!(CircuitBreaker::with_clock(config, MockClock::new()).is_err());
    }

    #[test]
    fn test_failure_at_max_timeout_opens_without_panicking() {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::builder()
            .failure_threshold(1)
            .timeout(MAX_TIMEOUT)
            .clock(clock.clone())
            .build()
            .expect("test breaker should build");

        let result = breaker.call(|| Err::<(), _>(std::io::Error::other("down")));
        assert!(matches!(result, Err(BreakerError::Operation(_))));

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.next_attempt, Some(clock.now() + MAX_TIMEOUT));
        assert!(breaker.call(|| Ok::<_, std::io::Error>(())).is_err());
    }

    /// Validates `call` hands back the action's value and counts it.
    ///
    /// Assertions:
    /// - Result is `Ok(42)`.
    /// - Action ran exactly once.
    /// - Stats show one admitted call.
    #[test]
    fn test_call_success_returns_value() {
        let breaker = CircuitBreaker::default();
        let invocations = AtomicU32::new(0);

        let result = breaker.call(|| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(42)
        });

        assert_eq!(result.expect("call should succeed"), 42);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.stats().total_calls, 1);
    }

    #[test]
    fn test_call_failure_passes_error_through() {
        let breaker = CircuitBreaker::default();

        let result = breaker.call(|| Err::<(), _>(io_err("connection refused")));

        let err = result.expect_err("call should fail").into_operation().expect("operation error");
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(breaker.stats().failure_count, 1);
    }

    #[test]
    fn test_rejected_call_never_runs_action() {
        let (breaker, _clock) = mock_breaker(1, Duration::from_secs(60));
        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        assert_eq!(breaker.state(), CircuitState::Open);

        let invocations = AtomicU32::new(0);
        let result = breaker.call(|| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(())
        });

        assert!(matches!(result, Err(BreakerError::CircuitOpen)));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejected_calls, 1);
    }

    #[test]
    fn test_is_call_permitted_does_not_transition() {
        let (breaker, clock) = mock_breaker(1, Duration::from_secs(10));
        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        assert!(!breaker.is_call_permitted());

        clock.advance(Duration::from_secs(10));
        assert!(breaker.is_call_permitted());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let breaker = CircuitBreaker::default();

        let ok = breaker.execute(|| async { Ok::<_, std::io::Error>("pong") }).await;
        assert_eq!(ok.expect("execute should succeed"), "pong");

        let err = breaker.execute(|| async { Err::<(), _>(io_err("timeout")) }).await;
        assert!(matches!(err, Err(BreakerError::Operation(_))));
        assert_eq!(breaker.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn test_execute_recovers_through_half_open() {
        let (breaker, clock) = mock_breaker(2, Duration::from_secs(30));

        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>(io_err("down")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(31));
        let probe = &breaker;
        let observed = breaker
            .execute(|| async move { Ok::<_, std::io::Error>(probe.state()) })
            .await
            .expect("trial call should be admitted");

        assert_eq!(observed, CircuitState::HalfOpen, "state must be half-open while trial runs");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Dropping an admitted future before it finishes frees its trial slot
    /// and records no outcome.
    #[tokio::test]
    async fn test_cancelled_trial_releases_slot() {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::builder()
            .clock(clock.clone())
            .failure_threshold(1)
            .timeout(Duration::from_secs(5))
            .half_open_max_calls(1)
            .build()
            .expect("test breaker should build");
        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        clock.advance(Duration::from_secs(5));

        {
            let pending = breaker.execute(|| std::future::pending::<Result<(), std::io::Error>>());
            let mut pending = Box::pin(pending);
            assert!(futures::poll!(pending.as_mut()).is_pending());
            assert_eq!(breaker.stats().trials_in_flight, 1);
            assert!(!breaker.is_call_permitted());
        }

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.trials_in_flight, 0);
        assert_eq!(stats.failure_count, 1);
        assert!(breaker.is_call_permitted());
    }

    #[test]
    fn test_panicking_action_releases_slot() {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::builder()
            .clock(clock.clone())
            .failure_threshold(1)
            .timeout(Duration::from_secs(5))
            .half_open_max_calls(1)
            .build()
            .expect("test breaker should build");
        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        clock.advance(Duration::from_secs(5));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            breaker.call(|| -> Result<(), std::io::Error> { panic!("action blew up") })
        }));

        assert!(outcome.is_err());
        assert_eq!(breaker.stats().trials_in_flight, 0);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_success_threshold_policy_through_call() {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::builder()
            .clock(clock.clone())
            .failure_threshold(1)
            .success_threshold(2)
            .timeout(Duration::from_secs(1))
            .close_policy(ClosePolicy::SuccessThreshold)
            .build()
            .expect("test breaker should build");
        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        clock.advance(Duration::from_secs(1));

        let _ = breaker.call(|| Ok::<_, std::io::Error>(()));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = breaker.call(|| Ok::<_, std::io::Error>(()));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_reset_closes_open_breaker() {
        let (breaker, _clock) = mock_breaker(1, Duration::from_secs(60));
        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.total_calls, 0);
        assert!(breaker.call(|| Ok::<_, std::io::Error>(())).is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let (breaker, _clock) = mock_breaker(2, Duration::from_secs(60));
        let other = breaker.clone();

        let _ = breaker.call(|| Err::<(), _>(io_err("down")));
        let _ = other.call(|| Err::<(), _>(io_err("down")));

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(other.stats().failure_count, 2);
    }

    #[test]
    fn test_debug_shows_state() {
        let breaker = CircuitBreaker::default();
        let rendered = format!("{breaker:?}");
        assert!(rendered.contains("CircuitBreaker"));
        assert!(rendered.contains("Closed"));
    }
}

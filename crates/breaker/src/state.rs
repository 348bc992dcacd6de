//! Circuit states and the transition core
//!
//! [`StateMachine`] is the whole decision logic of the breaker with no
//! locking and no clock of its own: every method takes the current instant
//! as an argument. [`CircuitBreaker`](crate::CircuitBreaker) wraps it in a
//! single mutex so admission, bookkeeping and the state triple
//! (`state`, `failure_count`, `next_attempt`) always move together.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{BreakerConfig, ClosePolicy, MAX_TIMEOUT};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls are admitted and failures are counted.
    Closed,
    /// Calls are rejected until the open timeout elapses.
    Open,
    /// Trial calls are admitted to probe recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Point-in-time view of a breaker, for health checks and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerStats {
    /// State governing admission.
    pub state: CircuitState,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// Consecutive successes in the current half-open window.
    pub half_open_successes: u32,
    /// Earliest instant a trial call is admitted; `Some` only while open.
    pub next_attempt: Option<Instant>,
    /// Trial calls currently running (tracked only with a half-open cap).
    pub trials_in_flight: u32,
    /// Calls admitted since construction or the last reset.
    pub total_calls: u64,
    /// Calls rejected since construction or the last reset.
    pub rejected_calls: u64,
    /// Times the circuit has opened since construction or the last reset.
    pub times_opened: u64,
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted(Permit),
    Rejected,
}

/// Ticket handed to an admitted call
///
/// Carries the half-open window it occupies a trial slot in, so a late
/// completion cannot free a slot of a later window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Permit {
    trial_epoch: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct StateMachine {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    next_attempt: Option<Instant>,
    trials_in_flight: u32,
    trial_epoch: u64,
    total_calls: u64,
    rejected_calls: u64,
    times_opened: u64,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            next_attempt: None,
            trials_in_flight: 0,
            trial_epoch: 0,
            total_calls: 0,
            rejected_calls: 0,
            times_opened: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    /// Decide whether a call may run, moving OPEN to HALF_OPEN once the
    /// timeout has passed.
    pub(crate) fn try_acquire(&mut self, config: &BreakerConfig, now: Instant) -> Admission {
        if self.state == CircuitState::Open && self.timeout_elapsed(now) {
            self.transition_to(CircuitState::HalfOpen, config, now);
        }

        let admission = match self.state {
            CircuitState::Closed => Admission::Admitted(Permit { trial_epoch: None }),
            CircuitState::Open => Admission::Rejected,
            CircuitState::HalfOpen => match config.half_open_max_calls {
                Some(max) if self.trials_in_flight >= max => Admission::Rejected,
                Some(_) => {
                    self.trials_in_flight += 1;
                    Admission::Admitted(Permit { trial_epoch: Some(self.trial_epoch) })
                }
                None => Admission::Admitted(Permit { trial_epoch: None }),
            },
        };

        match admission {
            Admission::Admitted(_) => self.total_calls += 1,
            Admission::Rejected => {
                self.rejected_calls += 1;
                debug!(state = %self.state, "circuit breaker rejected call");
            }
        }
        admission
    }

    /// Read-only version of [`try_acquire`](Self::try_acquire).
    pub(crate) fn is_call_permitted(&self, config: &BreakerConfig, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.timeout_elapsed(now),
            CircuitState::HalfOpen => {
                config.half_open_max_calls.map_or(true, |max| self.trials_in_flight < max)
            }
        }
    }

    /// Give back the trial slot held by `permit`, if any.
    pub(crate) fn release(&mut self, permit: Permit) {
        if let Some(epoch) = permit.trial_epoch {
            if self.state == CircuitState::HalfOpen && epoch == self.trial_epoch {
                self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
            }
        }
    }

    pub(crate) fn on_success(&mut self, config: &BreakerConfig, now: Instant) {
        self.failure_count = 0;

        if self.state != CircuitState::HalfOpen {
            return;
        }

        match config.close_policy {
            ClosePolicy::FirstSuccess => self.transition_to(CircuitState::Closed, config, now),
            ClosePolicy::SuccessThreshold => {
                self.half_open_successes += 1;
                if self.half_open_successes >= config.success_threshold {
                    self.transition_to(CircuitState::Closed, config, now);
                } else {
                    debug!(
                        successes = self.half_open_successes,
                        required = config.success_threshold,
                        "half-open trial succeeded"
                    );
                }
            }
        }
    }

    pub(crate) fn on_failure(&mut self, config: &BreakerConfig, now: Instant) {
        self.failure_count = self.failure_count.saturating_add(1);

        // A late failure from a call admitted before the circuit opened
        // must not push the retry instant further out.
        if self.state == CircuitState::Open {
            return;
        }

        let streak_broken = self.state == CircuitState::HalfOpen
            && config.close_policy == ClosePolicy::SuccessThreshold;

        if self.failure_count >= config.failure_threshold || streak_broken {
            self.transition_to(CircuitState::Open, config, now);
        } else {
            debug!(
                failures = self.failure_count,
                threshold = config.failure_threshold,
                "protected call failed below threshold"
            );
        }
    }

    /// Force the breaker back to a fresh CLOSED state.
    pub(crate) fn reset(&mut self) {
        *self = Self { trial_epoch: self.trial_epoch, ..Self::new() };
    }

    pub(crate) fn snapshot(&self) -> BreakerStats {
        BreakerStats {
            state: self.state,
            failure_count: self.failure_count,
            half_open_successes: self.half_open_successes,
            next_attempt: self.next_attempt,
            trials_in_flight: self.trials_in_flight,
            total_calls: self.total_calls,
            rejected_calls: self.rejected_calls,
            times_opened: self.times_opened,
        }
    }

    fn timeout_elapsed(&self, now: Instant) -> bool {
        self.next_attempt.is_some_and(|next| now >= next)
    }

    fn transition_to(&mut self, to: CircuitState, config: &BreakerConfig, now: Instant) {
        let from = self.state;

        match to {
            CircuitState::Open => {
                self.next_attempt = Some(open_deadline(now, config.timeout));
                self.times_opened += 1;
                warn!(
                    %from,
                    failures = self.failure_count,
                    timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                self.half_open_successes = 0;
                self.trials_in_flight = 0;
                self.trial_epoch = self.trial_epoch.wrapping_add(1);
                info!(%from, "circuit breaker half-open, admitting trial calls");
            }
            CircuitState::Closed => {
                self.next_attempt = None;
                self.half_open_successes = 0;
                info!(%from, "circuit breaker closed");
            }
        }

        self.state = to;
    }
}

/// Instant at which an OPEN circuit admits its next trial. Falls back to
/// [`MAX_TIMEOUT`] when `timeout` does not fit on the clock.
fn open_deadline(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .or_else(|| now.checked_add(timeout.min(MAX_TIMEOUT)))
        .unwrap_or(now)
}

//! Breaker configuration
//!
//! A breaker is configured once, at construction, and never changes
//! afterwards. [`BreakerConfig::builder`] validates before handing the value
//! out; constructing the struct directly is allowed but the breaker
//! re-validates it in [`CircuitBreaker::with_clock`](crate::CircuitBreaker::with_clock).

use std::time::Duration;

use crate::clock::Clock;
use crate::error::{ConfigError, ConfigResult};
use crate::CircuitBreaker;

/// Longest open timeout a breaker accepts (one year).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How a half-open breaker decides that the protected operation recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ClosePolicy {
    /// The first successful trial call closes the circuit.
    /// `success_threshold` is stored but not consulted.
    #[default]
    FirstSuccess,
    /// `success_threshold` consecutive successful trial calls close the
    /// circuit; any failed trial call reopens it.
    SuccessThreshold,
}

/// Fixed configuration of a [`CircuitBreaker`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BreakerConfig {
    /// Consecutive failures that trip the circuit open.
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close under
    /// [`ClosePolicy::SuccessThreshold`].
    pub success_threshold: u32,
    /// How long the circuit stays open before a trial call is admitted.
    #[cfg_attr(feature = "serde", serde(rename = "timeout_ms", with = "duration_millis"))]
    pub timeout: Duration,
    /// Half-open closing rule.
    pub close_policy: ClosePolicy,
    /// Cap on concurrent trial calls while half-open; `None` admits every
    /// call that arrives during the half-open window.
    pub half_open_max_calls: Option<u32>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            close_policy: ClosePolicy::FirstSuccess,
            half_open_max_calls: None,
        }
    }
}

impl BreakerConfig {
    /// Configuration with the three construction parameters and defaults for
    /// the rest.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if either threshold is zero or the timeout
    /// exceeds [`MAX_TIMEOUT`].
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
    ) -> ConfigResult<Self> {
        Self::builder()
            .failure_threshold(failure_threshold)
            .success_threshold(success_threshold)
            .timeout(timeout)
            .build()
    }

    /// Start a builder seeded with [`BreakerConfig::default`].
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// Check the configuration for values the breaker cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold", "must be greater than 0"));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold", "must be greater than 0"));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(ConfigError::invalid(
                "timeout",
                format!("must not exceed {} ms", MAX_TIMEOUT.as_millis()),
            ));
        }

        if self.half_open_max_calls == Some(0) {
            return Err(ConfigError::invalid(
                "half_open_max_calls",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

/// Builder for [`BreakerConfig`]
#[derive(Debug, Default)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    /// Builder seeded with [`BreakerConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures that open the circuit.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Trial successes needed under [`ClosePolicy::SuccessThreshold`].
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// How long the circuit stays open before admitting a trial.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Rule for closing a half-open circuit.
    pub fn close_policy(mut self, policy: ClosePolicy) -> Self {
        self.config.close_policy = policy;
        self
    }

    /// Cap concurrent trial calls while half-open.
    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = Some(max_calls);
        self
    }

    /// Attach a clock and build a breaker directly (mostly for tests).
    pub fn clock<C: Clock>(self, clock: C) -> BreakerBuilderWithClock<C> {
        BreakerBuilderWithClock { config: self.config, clock }
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if validation fails.
    pub fn build(self) -> ConfigResult<BreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder that carries a custom clock and yields a [`CircuitBreaker`]
#[derive(Debug)]
pub struct BreakerBuilderWithClock<C: Clock> {
    config: BreakerConfig,
    clock: C,
}

impl<C: Clock> BreakerBuilderWithClock<C> {
    /// Consecutive failures that open the circuit.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Trial successes needed under [`ClosePolicy::SuccessThreshold`].
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// How long the circuit stays open before admitting a trial.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Rule for closing a half-open circuit.
    pub fn close_policy(mut self, policy: ClosePolicy) -> Self {
        self.config.close_policy = policy;
        self
    }

    /// Cap concurrent trial calls while half-open.
    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = Some(max_calls);
        self
    }

    /// Validate the configuration and build the breaker.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if validation fails.
    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Serde helper encoding a `Duration` as whole milliseconds
#[cfg(feature = "serde")]
pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a `Duration` as milliseconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds into a `Duration`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

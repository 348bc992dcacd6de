//! Demo configuration loader
//!
//! Values are layered, later sources winning:
//! 1. Built-in defaults (3 failures to open, 2 successes, 10 s timeout,
//!    one request per second, 70 % failure rate)
//! 2. A config file, if one is found (TOML or JSON, by extension)
//! 3. Environment variables
//!
//! ## Environment Variables
//! - `BREAKWATER_FAILURE_THRESHOLD`: failures that open the circuit
//! - `BREAKWATER_SUCCESS_THRESHOLD`: successes used by the streak policy
//! - `BREAKWATER_TIMEOUT_MS`: open timeout in milliseconds
//! - `BREAKWATER_CLOSE_POLICY`: `first_success` or `success_threshold`
//! - `BREAKWATER_HALF_OPEN_MAX_CALLS`: cap on concurrent trial calls
//! - `BREAKWATER_INTERVAL_MS`: delay between requests in milliseconds
//! - `BREAKWATER_FAILURE_RATE`: probability in `[0, 1]` that a request fails
//! - `BREAKWATER_ITERATIONS`: stop after this many requests
//!
//! ## File Locations
//! `BREAKWATER_CONFIG` if set, otherwise the first existing of
//! `./breakwater.toml`, `./breakwater.json`, `./config.toml`, `./config.json`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use breakwater_core::{duration_millis, BreakerConfig, ClosePolicy};
use serde::{Deserialize, Serialize};

use crate::error::{DemoError, Result};

/// Settings for one demo run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Breaker under demonstration.
    pub breaker: BreakerConfig,
    /// Delay between consecutive requests.
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,
    /// Probability that a simulated request fails.
    pub failure_rate: f64,
    /// Stop after this many requests; run until interrupted when `None`.
    pub iterations: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                timeout: Duration::from_millis(10_000),
                ..BreakerConfig::default()
            },
            interval: Duration::from_millis(1_000),
            failure_rate: 0.7,
            iterations: None,
        }
    }
}

impl DemoConfig {
    /// Check every field, including the nested breaker configuration.
    ///
    /// # Errors
    /// Returns `DemoError::Config` for out-of-range demo settings and
    /// `DemoError::Breaker` for an invalid breaker configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(DemoError::Config(format!(
                "failure_rate must be between 0 and 1, got {}",
                self.failure_rate
            )));
        }
        if self.interval.is_zero() {
            return Err(DemoError::Config("interval_ms must be greater than 0".to_string()));
        }
        self.breaker.validate()?;
        Ok(())
    }
}

/// Load configuration from defaults, an optional file, then the environment.
///
/// # Errors
/// Returns `DemoError` if a file or variable cannot be parsed, or the result
/// fails validation.
pub fn load() -> Result<DemoConfig> {
    let mut config = match probe_config_path() {
        Some(path) => load_from_file(&path)?,
        None => {
            tracing::debug!("No config file found, using defaults");
            DemoConfig::default()
        }
    };
    apply_env(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML or JSON file.
///
/// # Errors
/// Returns `DemoError::Config` if the file cannot be read or parsed.
pub fn load_from_file(path: &Path) -> Result<DemoConfig> {
    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| DemoError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    parse_config(&contents, path)
}

fn parse_config(contents: &str, path: &Path) -> Result<DemoConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| DemoError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| DemoError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(DemoError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// First config file that exists, honouring `BREAKWATER_CONFIG`.
pub fn probe_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("BREAKWATER_CONFIG") {
        return Some(PathBuf::from(explicit));
    }

    let cwd = std::env::current_dir().ok()?;
    ["breakwater.toml", "breakwater.json", "config.toml", "config.json"]
        .into_iter()
        .map(|name| cwd.join(name))
        .find(|path| path.exists())
}

/// Override fields from `BREAKWATER_*` environment variables.
///
/// # Errors
/// Returns `DemoError::Config` naming the variable that failed to parse.
pub fn apply_env(config: &mut DemoConfig) -> Result<()> {
    if let Some(value) = env_parse::<u32>("BREAKWATER_FAILURE_THRESHOLD")? {
        config.breaker.failure_threshold = value;
    }
    if let Some(value) = env_parse::<u32>("BREAKWATER_SUCCESS_THRESHOLD")? {
        config.breaker.success_threshold = value;
    }
    if let Some(value) = env_parse::<u64>("BREAKWATER_TIMEOUT_MS")? {
        config.breaker.timeout = Duration::from_millis(value);
    }
    if let Some(value) = env_parse::<u32>("BREAKWATER_HALF_OPEN_MAX_CALLS")? {
        config.breaker.half_open_max_calls = Some(value);
    }
    if let Some(value) = env_string("BREAKWATER_CLOSE_POLICY") {
        config.breaker.close_policy = parse_close_policy(&value)?;
    }
    if let Some(value) = env_parse::<u64>("BREAKWATER_INTERVAL_MS")? {
        config.interval = Duration::from_millis(value);
    }
    if let Some(value) = env_parse::<f64>("BREAKWATER_FAILURE_RATE")? {
        config.failure_rate = value;
    }
    if let Some(value) = env_parse::<u64>("BREAKWATER_ITERATIONS")? {
        config.iterations = Some(value);
    }
    Ok(())
}

fn parse_close_policy(value: &str) -> Result<ClosePolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "first_success" => Ok(ClosePolicy::FirstSuccess),
        "success_threshold" => Ok(ClosePolicy::SuccessThreshold),
        other => Err(DemoError::Config(format!("Unknown close policy: {}", other))),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| DemoError::Config(format!("Invalid {}: {}", key, e)))
        })
        .transpose()
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

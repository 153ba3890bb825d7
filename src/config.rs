//! Engine Configuration
//!
//! Retry backoff and the overall time budget for one invocation.
//! Defaults can be overridden from the environment:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `STEPFLOW_RETRY_BASE_MS` | first retry delay |
//! | `STEPFLOW_RETRY_CAP_MS` | upper bound for any retry delay |
//! | `STEPFLOW_TIMEOUT_S` | overall deadline for a top-level run |

use std::time::Duration;

use log::warn;

pub const ENV_RETRY_BASE_MS: &str = "STEPFLOW_RETRY_BASE_MS";
pub const ENV_RETRY_CAP_MS: &str = "STEPFLOW_RETRY_CAP_MS";
pub const ENV_TIMEOUT_S: &str = "STEPFLOW_TIMEOUT_S";

/// Tunables shared by every context of an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Delay before the first retry; doubles per attempt
    pub retry_base: Duration,
    /// Upper bound for any single retry delay
    pub retry_cap: Duration,
    /// Random extra delay, as a fraction of the computed delay
    pub jitter: f64,
    /// Overall budget for a top-level run, none by default
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_base: Duration::from_millis(250),
            retry_cap: Duration::from_millis(2500),
            jitter: 0.1,
            timeout: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `STEPFLOW_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Values that do not parse are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_BASE_MS) {
            self.retry_base = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_CAP_MS) {
            self.retry_cap = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<f64>(&lookup, ENV_TIMEOUT_S) {
            match timeout_from_secs(secs) {
                Some(timeout) => self.timeout = Some(timeout),
                None => warn!(
                    "Ignoring {}={}: must be a positive number of seconds within range",
                    ENV_TIMEOUT_S, secs
                ),
            }
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Backoff before retrying after `attempt` (0-based): `min(cap, base * 2^attempt)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_base
            .checked_mul(factor)
            .unwrap_or(self.retry_cap)
            .min(self.retry_cap)
    }
}

/// Converts a seconds value to a timeout; `None` unless positive and representable.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}='{}': not a valid number", key, raw);
            None
        }
    }
}

//! Engine configuration read from the environment.
//!
//! | Variable                     | Meaning                           | Default |
//! |------------------------------|-----------------------------------|---------|
//! | `TABLETOP_BATCHING`          | batch outbound broadcasts         | `true`  |
//! | `TABLETOP_MAX_BATCH_SIZE`    | queue length that forces a flush  | `10`    |
//! | `TABLETOP_BATCH_DELAY_MS`    | debounce delay in milliseconds    | `50`    |
//! | `TABLETOP_STALE_ACTION_SECS` | age at which queued actions drop  | `1800`  |

use std::str::FromStr;
use std::time::Duration;

use tabletop_broadcast::BroadcasterConfig;
use thiserror::Error;

/// Enables or disables broadcast batching.
pub const BATCHING_VAR: &str = "TABLETOP_BATCHING";
/// Queue length that forces a flush.
pub const MAX_BATCH_SIZE_VAR: &str = "TABLETOP_MAX_BATCH_SIZE";
/// Debounce delay in milliseconds.
pub const BATCH_DELAY_MS_VAR: &str = "TABLETOP_BATCH_DELAY_MS";
/// Age in seconds after which queued actions are swept.
pub const STALE_ACTION_SECS_VAR: &str = "TABLETOP_STALE_ACTION_SECS";

const DEFAULT_STALE_ACTION_SECS: i64 = 30 * 60;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// The offending variable.
        key: &'static str,
        /// Its raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Settings shared by every session the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delivery mode and batching bounds of each session's broadcaster.
    pub broadcaster: BroadcasterConfig,
    /// Queued actions older than this are removed by a stale sweep.
    pub stale_action_age: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            broadcaster: BroadcasterConfig::default(),
            stale_action_age: chrono::Duration::seconds(DEFAULT_STALE_ACTION_SECS),
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        })
}

impl EngineConfig {
    /// Builds the configuration from a variable lookup. Unset variables
    /// keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a value that does not parse, for
    /// a maximum batch size of zero, and for a stale-action age that is not
    /// a positive, representable number of seconds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(BATCHING_VAR) {
            config.broadcaster.enable_batching = parse(BATCHING_VAR, value)?;
        }
        if let Some(value) = lookup(MAX_BATCH_SIZE_VAR) {
            let size: usize = parse(MAX_BATCH_SIZE_VAR, value.clone())?;
            if size == 0 {
                return Err(ConfigError::Invalid {
                    key: MAX_BATCH_SIZE_VAR,
                    value,
                    reason: "must be at least 1".to_owned(),
                });
            }
            config.broadcaster.max_batch_size = size;
        }
        if let Some(value) = lookup(BATCH_DELAY_MS_VAR) {
            config.broadcaster.batch_delay = Duration::from_millis(parse(BATCH_DELAY_MS_VAR, value)?);
        }
        if let Some(value) = lookup(STALE_ACTION_SECS_VAR) {
            let secs: i64 = parse(STALE_ACTION_SECS_VAR, value.clone())?;
            let invalid = |reason: &str| ConfigError::Invalid {
                key: STALE_ACTION_SECS_VAR,
                value: value.clone(),
                reason: reason.to_owned(),
            };
            if secs <= 0 {
                return Err(invalid("must be positive"));
            }
            config.stale_action_age =
                chrono::Duration::try_seconds(secs).ok_or_else(|| invalid("is out of range"))?;
        }
        Ok(config)
    }

    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

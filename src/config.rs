//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Per-unit simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConfig {
    /// Lower bound of the simulated duration.
    pub min_duration: Duration,
    /// Upper bound of the simulated duration. Equal to `min_duration` for a fixed duration.
    pub max_duration: Duration,
    /// Probability in `[0, 1]` that a unit which runs to completion succeeds.
    pub success_probability: f64,
}

impl UnitConfig {
    /// A unit that always takes exactly `duration`.
    pub fn fixed(duration: Duration, success_probability: f64) -> Self {
        Self {
            min_duration: duration,
            max_duration: duration,
            success_probability,
        }
    }

    /// Check bounds and probability.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_duration > self.max_duration {
            return Err(ConfigError::InvalidValue {
                key: "unit duration".into(),
                message: format!(
                    "min {:?} is greater than max {:?}",
                    self.min_duration, self.max_duration
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.success_probability) {
            return Err(ConfigError::InvalidValue {
                key: "success_probability".into(),
                message: format!("{} is not within [0, 1]", self.success_probability),
            });
        }
        Ok(())
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(1),
            max_duration: Duration::from_secs(3),
            success_probability: 0.9,
        }
    }
}

/// Orchestration core configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Largest batch a single command may request.
    pub max_batch_size: usize,
    /// Batch size used when a command does not give one.
    pub default_batch_size: usize,
    /// Default per-unit simulation parameters.
    pub unit: UnitConfig,
    /// Number of batches kept for metrics.
    pub history_window: usize,
    /// Seed for the random source (entropy when unset).
    pub seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            default_batch_size: 5,
            unit: UnitConfig::default(),
            history_window: 100,
            seed: None,
        }
    }
}

impl OrchestratorConfig {
    /// Build from `PRA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_batch_size: env_or("PRA_MAX_BATCH_SIZE", defaults.max_batch_size)?,
            default_batch_size: env_or("PRA_DEFAULT_BATCH_SIZE", defaults.default_batch_size)?,
            unit: UnitConfig {
                min_duration: Duration::from_millis(env_or(
                    "PRA_UNIT_MIN_MS",
                    defaults.unit.min_duration.as_millis() as u64,
                )?),
                max_duration: Duration::from_millis(env_or(
                    "PRA_UNIT_MAX_MS",
                    defaults.unit.max_duration.as_millis() as u64,
                )?),
                success_probability: env_or(
                    "PRA_SUCCESS_PROBABILITY",
                    defaults.unit.success_probability,
                )?,
            },
            history_window: env_or("PRA_HISTORY_WINDOW", defaults.history_window)?,
            seed: env_opt("PRA_SEED")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_batch_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.default_batch_size == 0 || self.default_batch_size > self.max_batch_size {
            return Err(ConfigError::InvalidValue {
                key: "default_batch_size".into(),
                message: format!("must be within 1..={}", self.max_batch_size),
            });
        }
        if self.history_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "history_window".into(),
                message: "must be at least 1".into(),
            });
        }
        self.unit.validate()
    }
}

/// Chat bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot name for identification.
    pub name: String,
    /// Telegram Bot API token. The CLI channel is used when unset.
    pub telegram_token: Option<SecretString>,
    /// Telegram usernames or numeric ids allowed to talk to the bot (`*` = anyone).
    pub allowed_users: Vec<String>,
    /// Simulated delay bounds for applying a single reaction.
    pub reaction_delay: (Duration, Duration),
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "parallel-reactions".to_string(),
            telegram_token: None,
            allowed_users: vec!["*".to_string()],
            reaction_delay: (Duration::from_millis(100), Duration::from_millis(500)),
        }
    }
}

impl BotConfig {
    /// Build from the environment (`TELEGRAM_BOT_TOKEN`, `TELEGRAM_ALLOWED_USERS`).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let telegram_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        let allowed_users: Vec<String> = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            telegram_token,
            allowed_users: if allowed_users.is_empty() {
                defaults.allowed_users
            } else {
                allowed_users
            },
            ..defaults
        }
    }
}

fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.default_batch_size, 5);
        assert_eq!(config.unit.success_probability, 0.9);
    }

    #[test]
    fn inverted_duration_bounds_rejected() {
        let unit = UnitConfig {
            min_duration: Duration::from_secs(3),
            max_duration: Duration::from_secs(1),
            success_probability: 0.5,
        };
        assert!(matches!(
            unit.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn probability_out_of_range_rejected() {
        let unit = UnitConfig::fixed(Duration::from_millis(10), 1.5);
        assert!(unit.validate().is_err());
        let unit = UnitConfig::fixed(Duration::from_millis(10), -0.1);
        assert!(unit.validate().is_err());
    }

    #[test]
    fn default_batch_size_must_fit_max() {
        let config = OrchestratorConfig {
            max_batch_size: 3,
            default_batch_size: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let config = OrchestratorConfig {
            history_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bot_config_defaults_allow_everyone() {
        let config = BotConfig::default();
        assert_eq!(config.allowed_users, vec!["*".to_string()]);
        assert!(config.telegram_token.is_none());
    }
}

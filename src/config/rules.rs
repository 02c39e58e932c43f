use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Permission and license rule caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    /// Interval between background reloads of the rule snapshots.
    /// Set to 0 to only reload on explicit invalidation.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Prefix every routed path is mounted under (e.g. "/api/v1").
    /// Request paths that do not already start with it get it prepended
    /// before matching.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Retry policy for reading the rule tables.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            path_prefix: None,
            retry: RetryConfig::default(),
        }
    }
}

impl RulesConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.path_prefix
            && (!prefix.starts_with('/') || prefix.ends_with('/'))
        {
            return Err(ConfigError::Validation(format!(
                "rules.path_prefix '{}' must start with '/' and must not end with '/'",
                prefix
            )));
        }
        self.retry.validate()
    }
}

fn default_refresh_interval() -> u64 {
    600 // 10 minutes
}

/// Retry configuration for rule store reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Enable retries.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter factor (0.0 - 1.0) applied to each delay.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled { self.max_retries + 1 } else { 1 }
    }

    /// Delay before retry number `attempt` (0-based), with jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);

        let jittered = if self.jitter > 0.0 {
            let j = capped * self.jitter;
            capped + rand::thread_rng().gen_range(-j..=j)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation(
                "rules.retry.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "rules.retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_capped() {
        let retry = RetryConfig {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(20), Duration::from_millis(5000));
    }

    #[test]
    fn test_disabled_retry_makes_one_attempt() {
        let retry = RetryConfig {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(retry.max_attempts(), 1);
    }

    #[test]
    fn test_zero_interval_disables_refresh() {
        let rules = RulesConfig {
            refresh_interval_secs: 0,
            ..Default::default()
        };
        assert!(rules.refresh_interval().is_none());
    }
}

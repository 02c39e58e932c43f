use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Impersonation handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImpersonationConfig {
    /// Path of the permission rule that grants the impersonation capability.
    /// A caller may impersonate when its base role passes the `POST` rule
    /// on this path.
    #[serde(default = "default_capability_path")]
    pub capability_path: String,

    /// What a request carrying an expired grant gets.
    #[serde(default)]
    pub on_expiry: ExpiryPolicy,

    /// Lifetime of newly issued grants, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImpersonationConfig {
    fn default() -> Self {
        Self {
            capability_path: default_capability_path(),
            on_expiry: ExpiryPolicy::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ImpersonationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !self.capability_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "impersonation.capability_path '{}' must start with '/'",
                self.capability_path
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "impersonation.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Behaviour for requests whose impersonation grant has expired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Deny with `IMPERSONATION_EXPIRED`.
    #[default]
    Deny,
    /// Evaluate the request as the impersonator's own base identity.
    Revert,
}

fn default_capability_path() -> String {
    "/impersonations".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

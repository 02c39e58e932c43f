//! Configuration for the access gate.
//!
//! Loaded from a TOML file, with environment variable interpolation using
//! `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! type = "sqlite"
//! path = "${ACCESSGATE_DATA}/rules.db"
//!
//! [rules]
//! path_prefix = "/api/v1"
//! refresh_interval_secs = 600
//!
//! [impersonation]
//! on_expiry = "deny"
//! ```

mod database;
mod enforcement;
mod impersonation;
mod observability;
mod roles;
mod rules;
mod server;

use std::path::Path;

pub use database::*;
pub use enforcement::*;
pub use impersonation::*;
use once_cell::sync::Lazy;
pub use observability::*;
use regex::Regex;
pub use roles::*;
pub use rules::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration.
///
/// Every section has defaults except the rule source: one of `[database]`
/// or `[seed]` must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessGateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database holding the permission and license rule tables.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// TOML file holding permission and license rules.
    #[serde(default)]
    pub seed: Option<SeedConfig>,

    /// Rule snapshot caching and path normalisation.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Role hierarchy. Defaults to the built-in role set.
    #[serde(default = "default_roles")]
    pub roles: Vec<RoleConfig>,

    /// Impersonation grants.
    #[serde(default)]
    pub impersonation: ImpersonationConfig,

    /// How decisions are applied to traffic.
    #[serde(default)]
    pub enforcement: EnforcementConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AccessGateConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: AccessGateConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.database, &self.seed) {
            (None, None) => {
                return Err(ConfigError::Validation(
                    "a rule source is required: configure [database] or [seed]".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Validation(
                    "[database] and [seed] are mutually exclusive".into(),
                ));
            }
            _ => {}
        }

        if let Some(database) = &self.database {
            database.validate()?;
        }

        self.server.validate()?;
        self.rules.validate()?;
        self.impersonation.validate()?;
        validate_roles(&self.roles)?;

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = AccessGateConfig::from_str(
            r#"
            [seed]
            path = "rules.toml"
        "#,
        )
        .unwrap();

        assert_eq!(config.roles, default_roles());
        assert_eq!(config.enforcement.mode, EnforcementMode::Enforce);
        assert_eq!(config.impersonation.on_expiry, ExpiryPolicy::Deny);
        assert_eq!(config.rules.refresh_interval_secs, 600);
    }

    #[test]
    fn test_rule_source_required() {
        let err = AccessGateConfig::from_str("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[cfg(feature = "database-sqlite")]
    #[test]
    fn test_database_and_seed_are_exclusive() {
        let err = AccessGateConfig::from_str(
            r#"
            [database]
            type = "sqlite"
            path = "rules.db"

            [seed]
            path = "rules.toml"
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_full_config() {
        let config = AccessGateConfig::from_str(
            r#"
            [seed]
            path = "rules.toml"

            [rules]
            path_prefix = "/api/v1"
            refresh_interval_secs = 30

            [rules.retry]
            max_retries = 5

            [[roles]]
            id = 10
            name = "owner"
            implies = [11]

            [[roles]]
            id = 11
            name = "viewer"

            [impersonation]
            capability_path = "/impersonations"
            on_expiry = "revert"

            [enforcement]
            mode = "report_only"
            log_allowed = true

            [observability.logging]
            level = "debug"
            format = "json"
        "#,
        )
        .unwrap();

        assert_eq!(config.rules.path_prefix.as_deref(), Some("/api/v1"));
        assert_eq!(config.rules.retry.max_retries, 5);
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.roles[0].implies, vec![crate::models::RoleId(11)]);
        assert_eq!(config.impersonation.on_expiry, ExpiryPolicy::Revert);
        assert_eq!(config.enforcement.mode, EnforcementMode::ReportOnly);
        assert!(config.enforcement.log_denied);
        assert_eq!(config.observability.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = AccessGateConfig::from_str(
            r#"
            [seed]
            path = "rules.toml"

            [rules]
            refresh_every = 10
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_path_prefix() {
        let err = AccessGateConfig::from_str(
            r#"
            [seed]
            path = "rules.toml"

            [rules]
            path_prefix = "/api/v1/"
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("path_prefix"));
    }

    #[test]
    fn test_duplicate_role_names_rejected() {
        let err = AccessGateConfig::from_str(
            r#"
            [seed]
            path = "rules.toml"

            [[roles]]
            id = 1
            name = "admin"

            [[roles]]
            id = 2
            name = "admin"
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_SEED_PATH", Some("/etc/accessgate/rules.toml"), || {
            let config = AccessGateConfig::from_str(
                r#"
                [seed]
                path = "${TEST_SEED_PATH}"
            "#,
            )
            .unwrap();
            assert_eq!(
                config.seed.unwrap().path,
                std::path::PathBuf::from("/etc/accessgate/rules.toml")
            );
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("TEST_MISSING_SEED", || {
            let err = expand_env_vars("path = \"${TEST_MISSING_SEED}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "TEST_MISSING_SEED"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# path = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# path = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_before_comment_expanded() {
        temp_env::with_var("TEST_BEFORE_COMMENT", Some("expanded"), || {
            let result =
                expand_env_vars("key = \"${TEST_BEFORE_COMMENT}\" # ${NOT_SET}").unwrap();
            assert_eq!(result, "key = \"expanded\" # ${NOT_SET}");
        });
    }
}

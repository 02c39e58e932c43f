use serde::{Deserialize, Serialize};

/// How decisions are applied to live traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnforcementConfig {
    #[serde(default)]
    pub mode: EnforcementMode,

    /// Log allowed decisions at info level (debug otherwise).
    #[serde(default)]
    pub log_allowed: bool,

    /// Log denied decisions at warn level (debug otherwise).
    #[serde(default = "default_true")]
    pub log_denied: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::default(),
            log_allowed: false,
            log_denied: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Denied requests are rejected.
    #[default]
    Enforce,
    /// Denied requests are logged and let through. Decisions are unchanged.
    ReportOnly,
}

fn default_true() -> bool {
    true
}

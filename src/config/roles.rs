use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::RoleId;

/// A role and the roles it directly implies.
///
/// A role satisfies every check for the roles it implies, transitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub implies: Vec<RoleId>,
}

impl RoleConfig {
    fn new(id: i32, name: &str, implies: &[i32]) -> Self {
        Self {
            id: RoleId(id),
            name: name.to_string(),
            implies: implies.iter().copied().map(RoleId).collect(),
        }
    }
}

/// Built-in hierarchy used when no `[[roles]]` are configured.
pub fn default_roles() -> Vec<RoleConfig> {
    vec![
        RoleConfig::new(1, "super_admin", &[5]),
        RoleConfig::new(2, "super_admin_read_only", &[3]),
        RoleConfig::new(3, "org_admin", &[4]),
        RoleConfig::new(4, "org_member", &[]),
        RoleConfig::new(5, "csm", &[2]),
        RoleConfig::new(6, "csm_auditor", &[7]),
        RoleConfig::new(7, "auditor", &[]),
    ]
}

/// Cheap structural checks; cycles and unknown references are reported by
/// the hierarchy builder.
pub(super) fn validate_roles(roles: &[RoleConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for role in roles {
        if role.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "role {} has an empty name",
                role.id
            )));
        }
        if !names.insert(role.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "role name '{}' is declared more than once",
                role.name
            )));
        }
    }
    Ok(())
}

mod common;
mod license_rules;
mod permissions;

pub use license_rules::SqliteLicenseRuleRepo;
pub use permissions::SqlitePermissionRuleRepo;

mod license_rules;
mod permissions;

pub use license_rules::*;
pub use permissions::*;

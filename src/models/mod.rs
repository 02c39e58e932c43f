mod identity;
mod ids;
mod license_rule;
mod permission_rule;

pub use identity::*;
pub use ids::*;
pub use license_rule::*;
pub use permission_rule::*;

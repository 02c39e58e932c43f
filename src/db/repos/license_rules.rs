use async_trait::async_trait;

use crate::{db::error::DbResult, models::LicenseRule};

/// Read access to license tier entitlements.
#[async_trait]
pub trait LicenseRuleRepo: Send + Sync {
    /// Every license rule. At most one per tier is valid; duplicates are
    /// reported when the snapshot is built.
    async fn list_all(&self) -> DbResult<Vec<LicenseRule>>;
}

use async_trait::async_trait;

use crate::{db::error::DbResult, models::PermissionRule};

/// Read access to the permission rule table.
///
/// The decision engine never writes rules; it loads the complete set into an
/// immutable snapshot at startup and on every refresh.
#[async_trait]
pub trait PermissionRuleRepo: Send + Sync {
    /// Every permission rule, in storage order.
    async fn list_all(&self) -> DbResult<Vec<PermissionRule>>;
}

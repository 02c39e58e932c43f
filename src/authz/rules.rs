//! Permission rule store.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    LoadError, RuleIndex, StoreError,
    store::{SnapshotLoader, SnapshotStore, StoreSettings},
};
use crate::{
    db::PermissionRuleRepo,
    models::{HttpMethod, PermissionRule},
};

pub struct PermissionRuleLoader {
    repo: Arc<dyn PermissionRuleRepo>,
}

impl PermissionRuleLoader {
    pub fn new(repo: Arc<dyn PermissionRuleRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SnapshotLoader for PermissionRuleLoader {
    type Snapshot = RuleIndex;

    fn name(&self) -> &'static str {
        "permission_rules"
    }

    async fn load(&self) -> Result<RuleIndex, LoadError> {
        let rules = self.repo.list_all().await?;
        Ok(RuleIndex::build(rules)?)
    }
}

pub type PermissionRuleStore = SnapshotStore<PermissionRuleLoader>;

impl SnapshotStore<PermissionRuleLoader> {
    pub async fn from_repo(
        repo: Arc<dyn PermissionRuleRepo>,
        settings: StoreSettings,
    ) -> Result<Self, StoreError> {
        Self::initialize(PermissionRuleLoader::new(repo), settings).await
    }

    /// Most specific rule for a normalised path in the current snapshot.
    pub fn get(&self, method: HttpMethod, path: &str) -> Option<Arc<PermissionRule>> {
        self.snapshot().find(method, path).cloned()
    }
}

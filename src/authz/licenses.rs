//! License rule store.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{
    LoadError, StoreError,
    store::{SnapshotLoader, SnapshotStore, StoreSettings},
};
use crate::{
    db::LicenseRuleRepo,
    models::{LicenseRule, LicenseTierId},
};

/// License rules keyed by tier.
#[derive(Debug, Default)]
pub struct LicenseCatalog {
    by_tier: HashMap<LicenseTierId, LicenseRule>,
}

impl LicenseCatalog {
    pub fn build(rules: impl IntoIterator<Item = LicenseRule>) -> Result<Self, LoadError> {
        let mut by_tier = HashMap::new();
        for rule in rules {
            let tier = rule.license_tier_id;
            if by_tier.insert(tier, rule).is_some() {
                return Err(LoadError::DuplicateLicenseTier(tier));
            }
        }
        Ok(Self { by_tier })
    }

    pub fn get(&self, tier: LicenseTierId) -> Option<&LicenseRule> {
        self.by_tier.get(&tier)
    }

    pub fn len(&self) -> usize {
        self.by_tier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tier.is_empty()
    }
}

pub struct LicenseRuleLoader {
    repo: Arc<dyn LicenseRuleRepo>,
}

impl LicenseRuleLoader {
    pub fn new(repo: Arc<dyn LicenseRuleRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SnapshotLoader for LicenseRuleLoader {
    type Snapshot = LicenseCatalog;

    fn name(&self) -> &'static str {
        "license_rules"
    }

    async fn load(&self) -> Result<LicenseCatalog, LoadError> {
        let rules = self.repo.list_all().await?;
        LicenseCatalog::build(rules)
    }
}

pub type LicenseRuleStore = SnapshotStore<LicenseRuleLoader>;

impl SnapshotStore<LicenseRuleLoader> {
    pub async fn from_repo(
        repo: Arc<dyn LicenseRuleRepo>,
        settings: StoreSettings,
    ) -> Result<Self, StoreError> {
        Self::initialize(LicenseRuleLoader::new(repo), settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{authz::store::tests::fast_settings, db::tests::memory::MemoryRuleRepo};

    #[test]
    fn test_duplicate_tier_rejected() {
        let err = LicenseCatalog::build(vec![
            LicenseRule::unlimited(LicenseTierId(1)),
            LicenseRule::unlimited(LicenseTierId(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateLicenseTier(LicenseTierId(1))));
    }

    #[tokio::test]
    async fn test_store_serves_rules_by_tier() {
        let repo = Arc::new(MemoryRuleRepo::new(
            vec![],
            vec![LicenseRule {
                max_applications: Some(3),
                ..LicenseRule::unlimited(LicenseTierId(2))
            }],
        ));
        let store = LicenseRuleStore::from_repo(repo, fast_settings()).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(LicenseTierId(2)).unwrap().max_applications, Some(3));
        assert!(snapshot.get(LicenseTierId(9)).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_tier_fails_initialization() {
        let repo = Arc::new(MemoryRuleRepo::new(
            vec![],
            vec![
                LicenseRule::unlimited(LicenseTierId(1)),
                LicenseRule::unlimited(LicenseTierId(1)),
            ],
        ));
        let err = LicenseRuleStore::from_repo(repo, fast_settings())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }
}

//! License quota enforcement for resource creation.
//!
//! Numeric quotas compare the count after the hypothetical creation against
//! the tier's limit. Catalog checks (standards and templates) are independent
//! and must pass as well.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LicenseCatalog, LicenseRuleStore};
use crate::{
    db::{DbError, DbResult},
    models::{LicenseRule, LicenseTierId, StandardId, TemplateId},
};

/// A creation that consumes license quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuotaOperation {
    CreateApplication {
        #[serde(default)]
        standards: BTreeSet<StandardId>,
    },
    CreateAssessment {
        application_id: Uuid,
        #[serde(default)]
        standard_id: Option<StandardId>,
        #[serde(default)]
        template_id: Option<TemplateId>,
    },
    AddStandards {
        application_id: Uuid,
        standards: BTreeSet<StandardId>,
    },
}

/// Current resource counts relevant to an operation.
///
/// `assessments` and `standards` refer to the target application;
/// `standards` holds the ids already attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    #[serde(default)]
    pub applications: u32,
    #[serde(default)]
    pub assessments: u32,
    #[serde(default)]
    pub standards: BTreeSet<StandardId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    /// No license, or no rule for the license tier.
    License,
    MaxApplications,
    MaxAssessments,
    MaxStandardsPerApplication,
    AvailableStandards,
    AvailableTemplates,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuotaKind::License => "license",
            QuotaKind::MaxApplications => "max_applications",
            QuotaKind::MaxAssessments => "max_assessments",
            QuotaKind::MaxStandardsPerApplication => "max_standards_per_application",
            QuotaKind::AvailableStandards => "available_standards",
            QuotaKind::AvailableTemplates => "available_templates",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaOutcome {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violated_quota: Option<QuotaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Catalog item the tier is not entitled to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_item: Option<i32>,
}

impl QuotaOutcome {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            violated_quota: None,
            limit: None,
            unavailable_item: None,
        }
    }

    fn exceeded(quota: QuotaKind, limit: u32) -> Self {
        Self {
            allowed: false,
            violated_quota: Some(quota),
            limit: Some(limit),
            unavailable_item: None,
        }
    }

    fn unavailable(quota: QuotaKind, item: i32) -> Self {
        Self {
            allowed: false,
            violated_quota: Some(quota),
            limit: None,
            unavailable_item: Some(item),
        }
    }

    fn no_license() -> Self {
        Self {
            allowed: false,
            violated_quota: Some(QuotaKind::License),
            limit: None,
            unavailable_item: None,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        (!self.allowed).then_some("QUOTA_EXCEEDED")
    }
}

/// Evaluate one operation against a license catalog.
pub fn evaluate_quota(
    catalog: &LicenseCatalog,
    operation: &QuotaOperation,
    tier: Option<LicenseTierId>,
    counts: &ResourceCounts,
) -> QuotaOutcome {
    let Some(rule) = tier.and_then(|tier| catalog.get(tier)) else {
        return QuotaOutcome::no_license();
    };

    match operation {
        QuotaOperation::CreateApplication { standards } => {
            if let Some(outcome) =
                check_limit(rule.max_applications, counts.applications, 1, QuotaKind::MaxApplications)
            {
                return outcome;
            }
            if let Some(outcome) = check_limit(
                rule.max_standards_per_application,
                0,
                standards.len(),
                QuotaKind::MaxStandardsPerApplication,
            ) {
                return outcome;
            }
            check_standards(rule, standards)
        }
        QuotaOperation::CreateAssessment {
            standard_id,
            template_id,
            ..
        } => {
            if let Some(outcome) =
                check_limit(rule.max_assessments, counts.assessments, 1, QuotaKind::MaxAssessments)
            {
                return outcome;
            }
            if let Some(standard) = standard_id
                && !rule.standard_available(*standard)
            {
                return QuotaOutcome::unavailable(QuotaKind::AvailableStandards, standard.0);
            }
            if let Some(template) = template_id
                && !rule.template_available(*template)
            {
                return QuotaOutcome::unavailable(QuotaKind::AvailableTemplates, template.0);
            }
            QuotaOutcome::allowed()
        }
        QuotaOperation::AddStandards { standards, .. } => {
            let after = counts.standards.union(standards).count();
            if let Some(outcome) = check_limit(
                rule.max_standards_per_application,
                0,
                after,
                QuotaKind::MaxStandardsPerApplication,
            ) {
                return outcome;
            }
            check_standards(rule, standards)
        }
    }
}

fn check_limit(
    limit: Option<u32>,
    current: u32,
    adding: usize,
    quota: QuotaKind,
) -> Option<QuotaOutcome> {
    let limit = limit?;
    let after = u64::from(current) + adding as u64;
    (after > u64::from(limit)).then(|| QuotaOutcome::exceeded(quota, limit))
}

fn check_standards(rule: &LicenseRule, standards: &BTreeSet<StandardId>) -> QuotaOutcome {
    match standards.iter().find(|s| !rule.standard_available(**s)) {
        Some(standard) => QuotaOutcome::unavailable(QuotaKind::AvailableStandards, standard.0),
        None => QuotaOutcome::allowed(),
    }
}

/// Checks quotas against the current license snapshot.
#[derive(Clone)]
pub struct LicenseQuotaEnforcer {
    licenses: Arc<LicenseRuleStore>,
}

impl LicenseQuotaEnforcer {
    pub fn new(licenses: Arc<LicenseRuleStore>) -> Self {
        Self { licenses }
    }

    pub fn check_quota(
        &self,
        operation: &QuotaOperation,
        tier: Option<LicenseTierId>,
        counts: &ResourceCounts,
    ) -> QuotaOutcome {
        let outcome = evaluate_quota(&self.licenses.snapshot(), operation, tier, counts);
        if !outcome.allowed {
            tracing::info!(
                tier = ?tier,
                quota = ?outcome.violated_quota,
                limit = ?outcome.limit,
                item = ?outcome.unavailable_item,
                "Quota check rejected creation"
            );
        }
        outcome
    }
}

/// Source of live resource counts, implemented by the domain layer.
#[async_trait]
pub trait ResourceCounter: Send + Sync {
    async fn count_applications(&self, organization_id: Uuid) -> DbResult<u32>;

    async fn count_assessments(&self, organization_id: Uuid, application_id: Uuid)
    -> DbResult<u32>;

    /// Standards currently attached to the application.
    async fn attached_standards(
        &self,
        organization_id: Uuid,
        application_id: Uuid,
    ) -> DbResult<BTreeSet<StandardId>>;
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError<E> {
    #[error("quota exceeded: {}", .0.violated_quota.map(|q| q.to_string()).unwrap_or_default())]
    Exceeded(QuotaOutcome),

    #[error("failed to count resources: {0}")]
    Count(DbError),

    #[error(transparent)]
    Create(E),
}

/// Serialises count-check-create per organization.
///
/// Without it, two concurrent creations could both read the same count and
/// both pass a quota only one of them fits in.
#[derive(Clone)]
pub struct QuotaGate {
    enforcer: LicenseQuotaEnforcer,
    locks: Arc<DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl QuotaGate {
    pub fn new(enforcer: LicenseQuotaEnforcer) -> Self {
        Self {
            enforcer,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn enforcer(&self) -> &LicenseQuotaEnforcer {
        &self.enforcer
    }

    /// Run `create` only if `operation` fits the organization's quota, with
    /// no other gated creation for the same organization in between.
    pub async fn create_within_quota<T, E, F, Fut>(
        &self,
        organization_id: Uuid,
        tier: Option<LicenseTierId>,
        operation: &QuotaOperation,
        counter: &dyn ResourceCounter,
        create: F,
    ) -> Result<T, QuotaError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let lock = self
            .locks
            .entry(organization_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.check_then_create(organization_id, tier, operation, counter, create)
                .await
        };

        // The map holds the only reference once no creation waits on the lock
        drop(lock);
        self.locks
            .remove_if(&organization_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn check_then_create<T, E, F, Fut>(
        &self,
        organization_id: Uuid,
        tier: Option<LicenseTierId>,
        operation: &QuotaOperation,
        counter: &dyn ResourceCounter,
        create: F,
    ) -> Result<T, QuotaError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let counts = gather_counts(counter, organization_id, operation)
            .await
            .map_err(QuotaError::Count)?;

        let outcome = self.enforcer.check_quota(operation, tier, &counts);
        if !outcome.allowed {
            return Err(QuotaError::Exceeded(outcome));
        }

        create().await.map_err(QuotaError::Create)
    }
}

async fn gather_counts(
    counter: &dyn ResourceCounter,
    organization_id: Uuid,
    operation: &QuotaOperation,
) -> DbResult<ResourceCounts> {
    let mut counts = ResourceCounts::default();
    match operation {
        QuotaOperation::CreateApplication { .. } => {
            counts.applications = counter.count_applications(organization_id).await?;
        }
        QuotaOperation::CreateAssessment { application_id, .. } => {
            counts.assessments = counter
                .count_assessments(organization_id, *application_id)
                .await?;
        }
        QuotaOperation::AddStandards { application_id, .. } => {
            counts.standards = counter
                .attached_standards(organization_id, *application_id)
                .await?;
        }
    }
    Ok(counts)
}

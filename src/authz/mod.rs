//! Authorization and license policy.
//!
//! Rules are loaded into immutable snapshots ([`store`]) and evaluated
//! synchronously per request by the [`AccessEngine`]. Quota checks for
//! resource creation go through the [`QuotaGate`].

mod engine;
mod error;
mod hierarchy;
mod impersonation;
mod licenses;
mod matcher;
mod quota;
mod resolver;
mod rules;
pub mod store;
pub mod template;

pub use engine::{AccessDecision, AccessEngine, AccessRequest, DenyReason, Verdict};
pub use error::{HierarchyError, LoadError, RuleIndexError, StoreError, TemplateError};
pub use hierarchy::RoleHierarchy;
pub use impersonation::{ImpersonationExpired, ImpersonationGuard, ImpersonationState};
pub use licenses::{LicenseCatalog, LicenseRuleLoader, LicenseRuleStore};
pub use matcher::RuleIndex;
pub use quota::{
    LicenseQuotaEnforcer, QuotaError, QuotaGate, QuotaKind, QuotaOperation, QuotaOutcome,
    ResourceCounter, ResourceCounts, evaluate_quota,
};
pub use resolver::{IdentityResolver, ResolveError};
pub use rules::{PermissionRuleLoader, PermissionRuleStore};
pub use store::{SnapshotLoader, SnapshotStore, StoreHealth, StoreSettings, Versioned};
pub use template::{PathTemplate, normalize_path};

#[cfg(test)]
pub(crate) use engine::tests as engine_tests;

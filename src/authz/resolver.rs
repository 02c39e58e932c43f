//! Effective identity resolution.
//!
//! Combines the impersonation guard with the impersonation capability check:
//! a caller may act as another user only while the grant is active and only
//! if its own base role passes the `POST` rule on the capability path. Ending
//! a grant early requires the `DELETE` rule on the same path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    RoleHierarchy, RuleIndex,
    impersonation::{ImpersonationExpired, ImpersonationGuard},
    template::normalize_path,
};
use crate::{
    config::ExpiryPolicy,
    models::{EffectiveIdentity, HttpMethod, ImpersonationGrant, LicenseTierId, RoleId, RoleIdentity},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The grant has expired and the expiry policy is `deny`.
    Expired(ImpersonationExpired),
    /// The base role does not hold the impersonation capability.
    NotPermitted { role: RoleId },
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    hierarchy: Arc<RoleHierarchy>,
    guard: ImpersonationGuard,
    capability_path: String,
    on_expiry: ExpiryPolicy,
}

impl IdentityResolver {
    pub fn new(
        hierarchy: Arc<RoleHierarchy>,
        guard: ImpersonationGuard,
        capability_path: &str,
        path_prefix: Option<&str>,
        on_expiry: ExpiryPolicy,
    ) -> Self {
        let capability_path = normalize_path(capability_path, path_prefix)
            .unwrap_or_else(|| capability_path.to_string());
        Self {
            hierarchy,
            guard,
            capability_path,
            on_expiry,
        }
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    pub fn capability_path(&self) -> &str {
        &self.capability_path
    }

    /// Whether `role` may impersonate under the given rule set.
    ///
    /// Without a capability rule nobody may impersonate.
    pub fn can_impersonate(&self, role: RoleId, rules: &RuleIndex) -> bool {
        self.holds_capability(HttpMethod::Post, role, rules)
    }

    /// Whether `role` may end an impersonation session early.
    pub fn can_end_impersonation(&self, role: RoleId, rules: &RuleIndex) -> bool {
        self.holds_capability(HttpMethod::Delete, role, rules)
    }

    fn holds_capability(&self, method: HttpMethod, role: RoleId, rules: &RuleIndex) -> bool {
        match rules.find(method, &self.capability_path) {
            Some(rule) => {
                rule.allow_all
                    || rule.allowed_roles.is_empty()
                    || self.hierarchy.satisfies_any(role, &rule.allowed_roles)
            }
            None => false,
        }
    }

    /// Resolve the identity a decision is evaluated against.
    pub fn resolve(
        &self,
        identity: &RoleIdentity,
        rules: &RuleIndex,
        now: DateTime<Utc>,
    ) -> Result<EffectiveIdentity, ResolveError> {
        let effective = match self.guard.validate(identity, now) {
            Ok(effective) => effective,
            Err(expired) => {
                return match self.on_expiry {
                    ExpiryPolicy::Deny => Err(ResolveError::Expired(expired)),
                    ExpiryPolicy::Revert => {
                        tracing::info!(
                            user_id = ?identity.user_id,
                            role = %identity.role_id,
                            expired_at = %expired.expired_at,
                            "Impersonation expired, evaluating as base identity"
                        );
                        Ok(expired.base)
                    }
                };
            }
        };

        if effective.impersonating && !self.can_impersonate(identity.role_id, rules) {
            return Err(ResolveError::NotPermitted {
                role: identity.role_id,
            });
        }

        Ok(effective)
    }

    /// Start impersonating `target_user` as `target_role`.
    pub fn begin_impersonation(
        &self,
        identity: &RoleIdentity,
        target_user: Uuid,
        target_role: RoleId,
        organization: Option<(Uuid, Option<LicenseTierId>)>,
        rules: &RuleIndex,
        now: DateTime<Utc>,
    ) -> Result<ImpersonationGrant, ResolveError> {
        if !self.can_impersonate(identity.role_id, rules) {
            return Err(ResolveError::NotPermitted {
                role: identity.role_id,
            });
        }

        let grant = self.guard.issue(target_user, target_role, organization, now);
        tracing::info!(
            user_id = ?identity.user_id,
            role = %identity.role_id,
            target_user = %target_user,
            target_role = %target_role,
            expires_at = %grant.expires_at,
            "Impersonation grant issued"
        );
        Ok(grant)
    }

    /// End the caller's impersonation grant now.
    ///
    /// Checked against the caller's base role, so an expired grant can still
    /// be ended. Returns `None` when the identity carries no grant.
    pub fn end_impersonation(
        &self,
        identity: &RoleIdentity,
        rules: &RuleIndex,
        now: DateTime<Utc>,
    ) -> Result<Option<ImpersonationGrant>, ResolveError> {
        if !self.can_end_impersonation(identity.role_id, rules) {
            return Err(ResolveError::NotPermitted {
                role: identity.role_id,
            });
        }

        let Some(mut grant) = identity.impersonation.clone() else {
            return Ok(None);
        };
        ImpersonationGuard::revoke(&mut grant, now);
        tracing::info!(
            user_id = ?identity.user_id,
            role = %identity.role_id,
            target_user = %grant.acting_as_user_id,
            ended_at = %grant.expires_at,
            "Impersonation grant ended"
        );
        Ok(Some(grant))
    }
}

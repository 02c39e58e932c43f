//! Access decision engine.
//!
//! Evaluation order for a request:
//! 1. No matching rule: deny `NO_RULE`.
//! 2. `allow_all` rule: allow.
//! 3. Resolve the effective identity (impersonation expiry and capability).
//! 4. Role restriction, checked through the role hierarchy.
//! 5. License restriction.
//! 6. Allow.
//!
//! Role and license restrictions are AND-ed; the role check runs first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IdentityResolver, PermissionRuleStore, ResolveError, template::normalize_path};
use crate::{
    config::EnforcementConfig,
    models::{HttpMethod, RoleId, RoleIdentity},
};

/// A request to authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub method: http::Method,
    pub path: String,
}

impl AccessRequest {
    pub fn new(method: http::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    NoRule,
    RoleNotPermitted,
    LicenseNotPermitted,
    ImpersonationExpired,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::NoRule => "NO_RULE",
            DenyReason::RoleNotPermitted => "ROLE_NOT_PERMITTED",
            DenyReason::LicenseNotPermitted => "LICENSE_NOT_PERMITTED",
            DenyReason::ImpersonationExpired => "IMPERSONATION_EXPIRED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NoRule => "No permission rule matches this request",
            DenyReason::RoleNotPermitted => "Role is not permitted to access this resource",
            DenyReason::LicenseNotPermitted => "License does not include access to this resource",
            DenyReason::ImpersonationExpired => "Impersonation has expired",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of one access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub verdict: Verdict,
    /// Template of the rule that matched, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Role evaluated after impersonation resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_role: Option<RoleId>,
    /// Generation of the rule snapshot used
    pub rule_generation: u64,
}

impl AccessDecision {
    fn allow(matched_rule: &str, effective_role: Option<RoleId>, generation: u64) -> Self {
        Self {
            verdict: Verdict::Allow,
            matched_rule: Some(matched_rule.to_string()),
            reason: None,
            effective_role,
            rule_generation: generation,
        }
    }

    fn deny(
        reason: DenyReason,
        matched_rule: Option<&str>,
        effective_role: Option<RoleId>,
        generation: u64,
    ) -> Self {
        Self {
            verdict: Verdict::Deny,
            matched_rule: matched_rule.map(str::to_string),
            reason: Some(reason),
            effective_role,
            rule_generation: generation,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

pub struct AccessEngine {
    rules: Arc<PermissionRuleStore>,
    resolver: IdentityResolver,
    path_prefix: Option<String>,
    audit: EnforcementConfig,
}

impl AccessEngine {
    pub fn new(
        rules: Arc<PermissionRuleStore>,
        resolver: IdentityResolver,
        path_prefix: Option<String>,
        audit: EnforcementConfig,
    ) -> Self {
        Self {
            rules,
            resolver,
            path_prefix,
            audit,
        }
    }

    pub fn rules(&self) -> &Arc<PermissionRuleStore> {
        &self.rules
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn decide(&self, request: &AccessRequest, identity: &RoleIdentity) -> AccessDecision {
        self.decide_at(request, identity, Utc::now())
    }

    /// Decide against an explicit clock.
    pub fn decide_at(
        &self,
        request: &AccessRequest,
        identity: &RoleIdentity,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let decision = self.evaluate(request, identity, now);
        self.record(request, identity, &decision);
        decision
    }

    fn evaluate(
        &self,
        request: &AccessRequest,
        identity: &RoleIdentity,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let snapshot = self.rules.snapshot();
        let generation = snapshot.generation;

        let rule = HttpMethod::try_from(&request.method)
            .ok()
            .zip(normalize_path(&request.path, self.path_prefix.as_deref()))
            .and_then(|(method, path)| snapshot.find(method, &path));

        let Some(rule) = rule else {
            return AccessDecision::deny(DenyReason::NoRule, None, None, generation);
        };
        let template = rule.api_path.as_str();

        if rule.allow_all {
            return AccessDecision::allow(template, None, generation);
        }

        let effective = match self.resolver.resolve(identity, &snapshot, now) {
            Ok(effective) => effective,
            Err(ResolveError::Expired(_)) => {
                return AccessDecision::deny(
                    DenyReason::ImpersonationExpired,
                    Some(template),
                    Some(identity.role_id),
                    generation,
                );
            }
            Err(ResolveError::NotPermitted { role }) => {
                return AccessDecision::deny(
                    DenyReason::RoleNotPermitted,
                    Some(template),
                    Some(role),
                    generation,
                );
            }
        };

        if !rule.allowed_roles.is_empty()
            && !self
                .resolver
                .hierarchy()
                .satisfies_any(effective.role_id, &rule.allowed_roles)
        {
            return AccessDecision::deny(
                DenyReason::RoleNotPermitted,
                Some(template),
                Some(effective.role_id),
                generation,
            );
        }

        if !rule.allowed_licenses.is_empty()
            && !effective
                .license_tier
                .is_some_and(|tier| rule.allowed_licenses.contains(&tier))
        {
            return AccessDecision::deny(
                DenyReason::LicenseNotPermitted,
                Some(template),
                Some(effective.role_id),
                generation,
            );
        }

        AccessDecision::allow(template, Some(effective.role_id), generation)
    }

    fn record(&self, request: &AccessRequest, identity: &RoleIdentity, decision: &AccessDecision) {
        match decision.reason {
            Some(reason) if self.audit.log_denied => tracing::warn!(
                method = %request.method,
                path = %request.path,
                user_id = ?identity.user_id,
                role = %identity.role_id,
                effective_role = ?decision.effective_role,
                rule = ?decision.matched_rule,
                reason = reason.code(),
                generation = decision.rule_generation,
                "Access denied"
            ),
            None if self.audit.log_allowed => tracing::info!(
                method = %request.method,
                path = %request.path,
                user_id = ?identity.user_id,
                role = %identity.role_id,
                effective_role = ?decision.effective_role,
                rule = ?decision.matched_rule,
                generation = decision.rule_generation,
                "Access allowed"
            ),
            _ => tracing::debug!(
                method = %request.method,
                path = %request.path,
                verdict = ?decision.verdict,
                reason = ?decision.reason,
                "Access decision"
            ),
        }
    }
}

//! Impersonation grant lifecycle.
//!
//! A grant is `Active` while `now < expires_at` and `Expired` from then on.
//! The state is recomputed from the clock on every request; nothing caches it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{EffectiveIdentity, ImpersonationGrant, LicenseTierId, RoleId, RoleIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpersonationState {
    Active,
    Expired,
}

/// Request carried an impersonation grant that is no longer valid.
///
/// `base` is the identity the request collapses to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationExpired {
    pub expired_at: DateTime<Utc>,
    pub base: EffectiveIdentity,
}

#[derive(Debug, Clone)]
pub struct ImpersonationGuard {
    timeout: Duration,
}

impl ImpersonationGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn state(grant: &ImpersonationGrant, now: DateTime<Utc>) -> ImpersonationState {
        if now < grant.expires_at {
            ImpersonationState::Active
        } else {
            ImpersonationState::Expired
        }
    }

    /// Resolve the identity a request acts as.
    ///
    /// Without a grant this is the base identity. An active grant substitutes
    /// the impersonated role, and the impersonated organization and license
    /// tier when the grant carries them.
    pub fn validate(
        &self,
        identity: &RoleIdentity,
        now: DateTime<Utc>,
    ) -> Result<EffectiveIdentity, ImpersonationExpired> {
        let base = identity.base();
        let Some(grant) = &identity.impersonation else {
            return Ok(base);
        };

        match Self::state(grant, now) {
            ImpersonationState::Active => Ok(EffectiveIdentity {
                user_id: Some(grant.acting_as_user_id),
                role_id: grant.acting_as_role_id,
                organization_id: grant.acting_as_organization_id.or(base.organization_id),
                license_tier: if grant.acting_as_organization_id.is_some() {
                    grant.acting_as_license_tier
                } else {
                    base.license_tier
                },
                impersonating: true,
            }),
            ImpersonationState::Expired => Err(ImpersonationExpired {
                expired_at: grant.expires_at,
                base,
            }),
        }
    }

    /// Issue a grant lasting the configured timeout.
    ///
    /// The caller is responsible for checking the impersonation capability.
    pub fn issue(
        &self,
        acting_as_user_id: Uuid,
        acting_as_role_id: RoleId,
        organization: Option<(Uuid, Option<LicenseTierId>)>,
        now: DateTime<Utc>,
    ) -> ImpersonationGrant {
        let lifetime = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let grant = ImpersonationGrant::new(acting_as_user_id, acting_as_role_id, expires_at);
        match organization {
            Some((org, tier)) => grant.in_organization(org, tier),
            None => grant,
        }
    }

    /// End a grant immediately. Idempotent; an already expired grant keeps
    /// its original expiry.
    pub fn revoke(grant: &mut ImpersonationGrant, now: DateTime<Utc>) {
        if grant.expires_at > now {
            grant.expires_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn csm() -> RoleIdentity {
        RoleIdentity::new(5)
            .with_organization(Uuid::from_u128(1))
            .with_license(2)
    }

    fn guard() -> ImpersonationGuard {
        ImpersonationGuard::new(Duration::from_secs(3600))
    }

    #[test]
    fn test_no_grant_is_base_identity() {
        let identity = csm();
        let effective = guard().validate(&identity, t(0)).unwrap();
        assert_eq!(effective, identity.base());
        assert!(!effective.impersonating);
    }

    #[test]
    fn test_active_grant_substitutes_role() {
        let customer_org = Uuid::from_u128(2);
        let grant = ImpersonationGrant::new(Uuid::from_u128(9), 3, t(60))
            .in_organization(customer_org, Some(LicenseTierId(4)));
        let identity = csm().impersonating(grant);

        let effective = guard().validate(&identity, t(59)).unwrap();
        assert_eq!(effective.role_id, RoleId(3));
        assert_eq!(effective.organization_id, Some(customer_org));
        assert_eq!(effective.license_tier, Some(LicenseTierId(4)));
        assert!(effective.impersonating);
    }

    #[test]
    fn test_grant_without_organization_keeps_base_license() {
        let grant = ImpersonationGrant::new(Uuid::from_u128(9), 3, t(60));
        let identity = csm().impersonating(grant);

        let effective = guard().validate(&identity, t(0)).unwrap();
        assert_eq!(effective.organization_id, Some(Uuid::from_u128(1)));
        assert_eq!(effective.license_tier, Some(LicenseTierId(2)));
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let grant = ImpersonationGrant::new(Uuid::from_u128(9), 3, t(60));
        assert_eq!(ImpersonationGuard::state(&grant, t(59)), ImpersonationState::Active);
        assert_eq!(ImpersonationGuard::state(&grant, t(60)), ImpersonationState::Expired);

        let identity = csm().impersonating(grant);
        let err = guard().validate(&identity, t(60)).unwrap_err();
        assert_eq!(err.expired_at, t(60));
        assert_eq!(err.base.role_id, RoleId(5));
        assert!(!err.base.impersonating);
    }

    #[test]
    fn test_revoke_expires_immediately() {
        let mut grant = ImpersonationGrant::new(Uuid::from_u128(9), 3, t(600));
        ImpersonationGuard::revoke(&mut grant, t(10));
        assert_eq!(ImpersonationGuard::state(&grant, t(10)), ImpersonationState::Expired);

        // revoking again later does not move the expiry forward
        ImpersonationGuard::revoke(&mut grant, t(20));
        assert_eq!(grant.expires_at, t(10));
    }

    #[test]
    fn test_issue_uses_timeout() {
        let grant = guard().issue(Uuid::from_u128(9), RoleId(3), None, t(0));
        assert_eq!(grant.expires_at, t(3600));
        assert_eq!(grant.acting_as_role_id, RoleId(3));
    }
}

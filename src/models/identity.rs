use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LicenseTierId, RoleId};

/// An authenticated caller as seen by the decision engine.
///
/// Token verification happens upstream; the engine trusts these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleIdentity {
    /// Authenticated user, used for logging only
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub role_id: RoleId,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub license_tier: Option<LicenseTierId>,
    #[serde(default)]
    pub impersonation: Option<ImpersonationGrant>,
}

impl RoleIdentity {
    pub fn new(role_id: impl Into<RoleId>) -> Self {
        Self {
            user_id: None,
            role_id: role_id.into(),
            organization_id: None,
            license_tier: None,
            impersonation: None,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_license(mut self, tier: impl Into<LicenseTierId>) -> Self {
        self.license_tier = Some(tier.into());
        self
    }

    pub fn impersonating(mut self, grant: ImpersonationGrant) -> Self {
        self.impersonation = Some(grant);
        self
    }

    /// The identity with any impersonation dropped.
    pub fn base(&self) -> EffectiveIdentity {
        EffectiveIdentity {
            user_id: self.user_id,
            role_id: self.role_id,
            organization_id: self.organization_id,
            license_tier: self.license_tier,
            impersonating: false,
        }
    }
}

/// Time-boxed permission to act as another user.
///
/// The impersonated user's organization and license tier, when present,
/// replace the impersonator's own for the duration of the grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationGrant {
    pub acting_as_user_id: Uuid,
    pub acting_as_role_id: RoleId,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub acting_as_organization_id: Option<Uuid>,
    #[serde(default)]
    pub acting_as_license_tier: Option<LicenseTierId>,
}

impl ImpersonationGrant {
    pub fn new(
        acting_as_user_id: Uuid,
        acting_as_role_id: impl Into<RoleId>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            acting_as_user_id,
            acting_as_role_id: acting_as_role_id.into(),
            expires_at,
            acting_as_organization_id: None,
            acting_as_license_tier: None,
        }
    }

    pub fn in_organization(mut self, organization_id: Uuid, tier: Option<LicenseTierId>) -> Self {
        self.acting_as_organization_id = Some(organization_id);
        self.acting_as_license_tier = tier;
        self
    }
}

/// Identity a decision is evaluated against, after impersonation is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveIdentity {
    pub user_id: Option<Uuid>,
    pub role_id: RoleId,
    pub organization_id: Option<Uuid>,
    pub license_tier: Option<LicenseTierId>,
    pub impersonating: bool,
}

//! Decision API.
//!
//! Lets services without the middleware ask for decisions over HTTP.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::{
    AppState,
    authz::{AccessDecision, AccessRequest, QuotaOperation, QuotaOutcome, ResourceCounts},
    models::{ImpersonationGrant, LicenseTierId, RoleId, RoleIdentity},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRequest {
    pub method: String,
    pub path: String,
    pub identity: RoleIdentity,
}

/// Evaluate one request against the current permission rules.
#[tracing::instrument(name = "decisions.evaluate", skip_all)]
pub async fn evaluate_decision(
    State(state): State<AppState>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<AccessDecision>, ApiError> {
    let method = http::Method::from_bytes(body.method.as_bytes())
        .map_err(|_| ApiError::BadRequest(format!("invalid HTTP method '{}'", body.method)))?;

    let request = AccessRequest::new(method, body.path);
    Ok(Json(state.engine.decide(&request, &body.identity)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaCheckRequest {
    pub operation: QuotaOperation,
    #[serde(default)]
    pub license_tier: Option<LicenseTierId>,
    #[serde(default)]
    pub counts: ResourceCounts,
}

/// Check a creation against the license quotas, given the caller's counts.
#[tracing::instrument(name = "decisions.quota_check", skip_all)]
pub async fn check_quota(
    State(state): State<AppState>,
    Json(body): Json<QuotaCheckRequest>,
) -> Json<QuotaOutcome> {
    Json(
        state
            .quota
            .enforcer()
            .check_quota(&body.operation, body.license_tier, &body.counts),
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImpersonationRequest {
    /// The caller requesting the grant
    pub identity: RoleIdentity,
    pub target_user_id: Uuid,
    pub target_role_id: RoleId,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub license_tier: Option<LicenseTierId>,
}

/// Issue an impersonation grant if the caller holds the capability.
#[tracing::instrument(name = "decisions.impersonate", skip_all)]
pub async fn begin_impersonation(
    State(state): State<AppState>,
    Json(body): Json<ImpersonationRequest>,
) -> Result<Json<ImpersonationGrant>, ApiError> {
    let resolver = state.engine.resolver();
    if resolver.hierarchy().name(body.target_role_id).is_none() {
        return Err(ApiError::BadRequest(format!(
            "unknown role {}",
            body.target_role_id
        )));
    }

    let organization = body.organization_id.map(|org| (org, body.license_tier));
    let grant = resolver.begin_impersonation(
        &body.identity,
        body.target_user_id,
        body.target_role_id,
        organization,
        &state.permissions.snapshot(),
        Utc::now(),
    )?;

    Ok(Json(grant))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndImpersonationRequest {
    /// The caller, carrying the grant to end
    pub identity: RoleIdentity,
}

/// End the caller's impersonation grant if it holds the capability.
#[tracing::instrument(name = "decisions.end_impersonation", skip_all)]
pub async fn end_impersonation(
    State(state): State<AppState>,
    Json(body): Json<EndImpersonationRequest>,
) -> Result<Json<ImpersonationGrant>, ApiError> {
    let grant = state
        .engine
        .resolver()
        .end_impersonation(&body.identity, &state.permissions.snapshot(), Utc::now())?
        .ok_or_else(|| ApiError::BadRequest("no impersonation grant to end".to_string()))?;

    Ok(Json(grant))
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub permission_rules: u64,
    pub license_rules: u64,
}

/// Reload both rule snapshots from the source.
///
/// Each store is reloaded independently; a failure leaves that store on its
/// previous snapshot.
#[tracing::instrument(name = "admin.rules.invalidate", skip(state))]
pub async fn invalidate_rules(
    State(state): State<AppState>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let (permissions, licenses) =
        tokio::join!(state.permissions.invalidate(), state.licenses.invalidate());

    let response = InvalidateResponse {
        permission_rules: permissions?,
        license_rules: licenses?,
    };
    tracing::info!(
        permission_rules = response.permission_rules,
        license_rules = response.license_rules,
        "Rule snapshots invalidated"
    );
    Ok(Json(response))
}

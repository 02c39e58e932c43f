//! Access enforcement middleware.
//!
//! Expects an upstream authentication layer to have inserted a
//! [`RoleIdentity`] into the request extensions. The resulting
//! [`AccessDecision`] is passed on to handlers the same way.

use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    authz::{AccessDecision, AccessRequest},
    config::EnforcementMode,
    models::RoleIdentity,
    routes::ApiError,
};

/// Decide every request against the permission rules.
///
/// Denials become 403 responses (401 for an expired impersonation). In
/// `report_only` mode the denial is logged and the request proceeds; the
/// decision attached to the request still records the denial.
pub async fn enforce_access(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(identity) = req.extensions().get::<RoleIdentity>().cloned() else {
        tracing::debug!(path = %req.uri().path(), "Request has no identity");
        return ApiError::Unauthenticated.into_response();
    };

    // Nested routers see a stripped path; rules are written against the full one.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let request = AccessRequest::new(req.method().clone(), path);
    let decision = state.engine.decide(&request, &identity);

    if let Some(reason) = decision.reason {
        match state.config.enforcement.mode {
            EnforcementMode::Enforce => return ApiError::Denied(reason).into_response(),
            EnforcementMode::ReportOnly => tracing::warn!(
                method = %request.method,
                path = %request.path,
                reason = reason.code(),
                "Report-only mode: denied request allowed through"
            ),
        }
    }

    req.extensions_mut().insert::<AccessDecision>(decision);
    next.run(req).await
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::authz::{DenyReason, ResolveError, StoreError};

/// Error returned by routes and middleware as
/// `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug)]
pub enum ApiError {
    /// No authenticated identity on the request.
    Unauthenticated,
    Denied(DenyReason),
    BadRequest(String),
    Store(StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Denied(DenyReason::ImpersonationExpired) => StatusCode::UNAUTHORIZED,
            ApiError::Denied(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Unavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(StoreError::Invalid { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Denied(reason) => reason.code(),
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Store(err) => err.code(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Expired(_) => ApiError::Denied(DenyReason::ImpersonationExpired),
            ResolveError::NotPermitted { .. } => ApiError::Denied(DenyReason::RoleNotPermitted),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            ApiError::Unauthenticated => "Authentication required".to_string(),
            ApiError::Denied(reason) => reason.message().to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Store(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %message, "Request failed");
        }

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_impersonation_is_unauthorized() {
        let err = ApiError::Denied(DenyReason::ImpersonationExpired);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "IMPERSONATION_EXPIRED");
    }

    #[test]
    fn test_other_denials_are_forbidden() {
        for reason in [
            DenyReason::NoRule,
            DenyReason::RoleNotPermitted,
            DenyReason::LicenseNotPermitted,
        ] {
            assert_eq!(ApiError::Denied(reason).status(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::BadRequest("bad method".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "bad method");
    }
}

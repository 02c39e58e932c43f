//! Health check endpoint.

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;

use crate::{
    AppState,
    authz::{SnapshotLoader, SnapshotStore, StoreHealth},
};

/// Overall health response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy", or "degraded" while a store serves a stale snapshot or its
    /// last reload failed
    pub status: String,
    pub version: String,
    pub subsystems: SubsystemStatus,
}

#[derive(Debug, Serialize)]
pub struct SubsystemStatus {
    pub permission_rules: ComponentStatus,
    pub license_rules: ComponentStatus,
}

/// Status of one rule store.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    /// Generation of the snapshot being served
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    /// Snapshot is older than the refresh interval
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    fn of<L: SnapshotLoader>(store: &SnapshotStore<L>, now: DateTime<Utc>) -> Self {
        let snapshot = store.snapshot();
        let (degraded_since, message) = match store.health() {
            StoreHealth::Healthy => (None, None),
            StoreHealth::Degraded { since, last_error } => (Some(since), Some(last_error)),
        };
        Self {
            healthy: degraded_since.is_none(),
            generation: snapshot.generation,
            loaded_at: snapshot.loaded_at,
            stale: store.is_stale(now),
            degraded_since,
            message,
        }
    }
}

/// Report rule store health.
///
/// A degraded store still answers from its last-known-good snapshot, so the
/// endpoint returns 200 in both states.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let subsystems = SubsystemStatus {
        permission_rules: ComponentStatus::of(&state.permissions, now),
        license_rules: ComponentStatus::of(&state.licenses, now),
    };

    let healthy = [&subsystems.permission_rules, &subsystems.license_rules]
        .iter()
        .all(|c| c.healthy && !c.stale);

    let health = HealthStatus {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subsystems,
    };

    (StatusCode::OK, Json(health))
}

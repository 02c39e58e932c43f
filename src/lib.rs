//! Request authorization and license-policy decisions.
//!
//! Permission rules map `(method, path template)` to the roles and license
//! tiers allowed to call an endpoint. The [`authz::AccessEngine`] evaluates
//! requests against an in-memory snapshot of those rules; license quotas are
//! enforced on resource creation through the [`authz::QuotaGate`].

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use http::HeaderName;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub mod authz;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;

use authz::{
    AccessEngine, HierarchyError, IdentityResolver, ImpersonationGuard, LicenseQuotaEnforcer,
    LicenseRuleStore, PermissionRuleStore, QuotaGate, RoleHierarchy, StoreError, StoreSettings,
};
use config::{AccessGateConfig, ConfigError};
use db::{DbError, RuleRepos};

/// Shared state for routes and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AccessGateConfig>,
    pub permissions: Arc<PermissionRuleStore>,
    pub licenses: Arc<LicenseRuleStore>,
    pub engine: Arc<AccessEngine>,
    pub quota: QuotaGate,
    /// Cancels the background refresh workers.
    pub cancel: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open rule source: {0}")]
    Db(#[from] DbError),

    #[error("Invalid role hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("Failed to load rules: {0}")]
    Store(#[from] StoreError),
}

impl AppState {
    /// Open the configured rule source and load both rule snapshots.
    ///
    /// Fails closed: no state, and so no decisions, without a successful
    /// initial load.
    pub async fn new(config: AccessGateConfig) -> Result<Self, StartupError> {
        let repos = RuleRepos::from_config(&config).await?;
        Self::from_repos(config, repos).await
    }

    pub async fn from_repos(config: AccessGateConfig, repos: RuleRepos) -> Result<Self, StartupError> {
        let hierarchy = Arc::new(RoleHierarchy::build(&config.roles)?);
        let settings = StoreSettings::from(&config.rules);

        let (permissions, licenses) = tokio::try_join!(
            PermissionRuleStore::from_repo(repos.permissions, settings.clone()),
            LicenseRuleStore::from_repo(repos.licenses, settings),
        )?;
        let permissions = Arc::new(permissions);
        let licenses = Arc::new(licenses);

        let resolver = IdentityResolver::new(
            hierarchy.clone(),
            ImpersonationGuard::new(config.impersonation.timeout()),
            &config.impersonation.capability_path,
            config.rules.path_prefix.as_deref(),
            config.impersonation.on_expiry,
        );
        let engine = AccessEngine::new(
            permissions.clone(),
            resolver,
            config.rules.path_prefix.clone(),
            config.enforcement.clone(),
        );
        let quota = QuotaGate::new(LicenseQuotaEnforcer::new(licenses.clone()));

        tracing::info!(
            permission_rules = permissions.snapshot().len(),
            license_rules = licenses.snapshot().len(),
            roles = hierarchy.len(),
            mode = ?config.enforcement.mode,
            "Access gate initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            permissions,
            licenses,
            engine: Arc::new(engine),
            quota,
            cancel: CancellationToken::new(),
        })
    }

    /// Start periodic reloads of both stores. Stopped by [`AppState::shutdown`].
    pub fn spawn_refresh_workers(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.permissions.clone().run_refresh_worker(self.cancel.clone())),
            tokio::spawn(self.licenses.clone().run_refresh_worker(self.cancel.clone())),
        ]
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub fn build_app(config: &AccessGateConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/v1/decisions", post(routes::decisions::evaluate_decision))
        .route("/v1/quota-checks", post(routes::decisions::check_quota))
        .route(
            "/v1/impersonations",
            post(routes::decisions::begin_impersonation)
                .delete(routes::decisions::end_impersonation),
        );

    if config.server.admin_routes {
        app = app.route(
            "/admin/rules/invalidate",
            post(routes::decisions::invalidate_rules),
        );
    }

    // Validated at config load
    let request_id = HeaderName::from_bytes(config.server.request_id_header.as_bytes())
        .unwrap_or(HeaderName::from_static("x-request-id"));

    app.layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::{
        db::tests::memory::MemoryRuleRepo,
        models::{LicenseRule, PermissionRule},
    };

    const BASE_CONFIG: &str = r#"
[seed]
path = "unused-rules.toml"

[rules]
path_prefix = "/api/v1"
refresh_interval_secs = 0

[rules.retry]
max_retries = 1
initial_delay_ms = 1
max_delay_ms = 1
jitter = 0.0
"#;

    /// State over an in-memory repository, with `extra` TOML appended to
    /// the base test config.
    pub(crate) async fn test_state_with_repo(
        extra: &str,
        permissions: Vec<PermissionRule>,
        licenses: Vec<LicenseRule>,
    ) -> (AppState, Arc<MemoryRuleRepo>) {
        let config = AccessGateConfig::from_str(&format!("{BASE_CONFIG}\n{extra}"))
            .expect("Failed to parse test config");
        let repo = Arc::new(MemoryRuleRepo::new(permissions, licenses));
        let repos = RuleRepos {
            permissions: repo.clone(),
            licenses: repo.clone(),
        };
        let state = AppState::from_repos(config, repos)
            .await
            .expect("Failed to create AppState");
        (state, repo)
    }

    pub(crate) async fn test_state(
        extra: &str,
        permissions: Vec<PermissionRule>,
        licenses: Vec<LicenseRule>,
    ) -> AppState {
        test_state_with_repo(extra, permissions, licenses).await.0
    }
}

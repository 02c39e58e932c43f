//! Versioned, atomically swapped rule snapshots.
//!
//! A store is only constructed once its first load succeeds, so there is
//! always a snapshot to serve. Decisions clone the current `Arc` and never
//! wait on storage. Reloads build a complete new snapshot off to the side
//! and swap the pointer. A failed reload keeps the previous snapshot and
//! marks the store degraded until the next success.

use std::{ops::Deref, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{LoadError, StoreError};
use crate::config::{RetryConfig, RulesConfig};

/// Produces a complete snapshot from the backing source.
#[async_trait]
pub trait SnapshotLoader: Send + Sync + 'static {
    type Snapshot: Send + Sync + 'static;

    /// Name used in logs, errors and health output.
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Self::Snapshot, LoadError>;
}

/// A snapshot together with the generation that produced it.
#[derive(Debug)]
pub struct Versioned<S> {
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub value: S,
}

impl<S> Deref for Versioned<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreHealth {
    Healthy,
    /// Serving the last-known-good snapshot after a failed reload.
    Degraded {
        since: DateTime<Utc>,
        last_error: String,
    },
}

impl StoreHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, StoreHealth::Healthy)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    pub retry: RetryConfig,
    pub refresh_interval: Option<Duration>,
}

impl From<&RulesConfig> for StoreSettings {
    fn from(config: &RulesConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            refresh_interval: config.refresh_interval(),
        }
    }
}

pub struct SnapshotStore<L: SnapshotLoader> {
    loader: L,
    settings: StoreSettings,
    current: RwLock<Arc<Versioned<L::Snapshot>>>,
    health: RwLock<StoreHealth>,
    reload: tokio::sync::Mutex<()>,
}

impl<L: SnapshotLoader> SnapshotStore<L> {
    /// Perform the initial load.
    ///
    /// Fails when the source stays unreachable through every retry or holds
    /// an invalid rule set. Callers must not serve decisions without a store.
    pub async fn initialize(loader: L, settings: StoreSettings) -> Result<Self, StoreError> {
        let value = fetch_with_retry(&loader, &settings.retry).await.inspect_err(|e| {
            tracing::error!(store = loader.name(), code = e.code(), error = %e, "Initial rule load failed");
        })?;

        tracing::info!(store = loader.name(), generation = 1, "Rule snapshot loaded");

        Ok(Self {
            current: RwLock::new(Arc::new(Versioned {
                generation: 1,
                loaded_at: Utc::now(),
                value,
            })),
            health: RwLock::new(StoreHealth::Healthy),
            reload: tokio::sync::Mutex::new(()),
            loader,
            settings,
        })
    }

    pub fn name(&self) -> &'static str {
        self.loader.name()
    }

    /// The current snapshot. Cheap; holds the lock only to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<Versioned<L::Snapshot>> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    pub fn health(&self) -> StoreHealth {
        self.health.read().clone()
    }

    /// Whether the snapshot is older than the refresh interval.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let Some(interval) = self.settings.refresh_interval else {
            return false;
        };
        let age = now - self.current.read().loaded_at;
        age.to_std().is_ok_and(|age| age > interval)
    }

    /// Read a fresh snapshot from the source without installing it.
    pub async fn load(&self) -> Result<L::Snapshot, StoreError> {
        fetch_with_retry(&self.loader, &self.settings.retry).await
    }

    /// Reload from the source and swap the new snapshot in.
    ///
    /// Returns the new generation. On failure the previous snapshot stays in
    /// place and the store reports degraded health.
    pub async fn invalidate(&self) -> Result<u64, StoreError> {
        let _reload = self.reload.lock().await;

        match self.load().await {
            Ok(value) => {
                let generation = {
                    let mut current = self.current.write();
                    let generation = current.generation + 1;
                    *current = Arc::new(Versioned {
                        generation,
                        loaded_at: Utc::now(),
                        value,
                    });
                    generation
                };

                let recovered = !self.health.read().is_healthy();
                *self.health.write() = StoreHealth::Healthy;

                if recovered {
                    tracing::info!(store = self.name(), generation, "Rule store recovered");
                } else {
                    tracing::debug!(store = self.name(), generation, "Rule snapshot reloaded");
                }
                Ok(generation)
            }
            Err(e) => {
                tracing::warn!(
                    store = self.name(),
                    code = e.code(),
                    error = %e,
                    generation = self.generation(),
                    "Rule reload failed, serving last-known-good snapshot"
                );
                let mut health = self.health.write();
                let since = match &*health {
                    StoreHealth::Degraded { since, .. } => *since,
                    StoreHealth::Healthy => Utc::now(),
                };
                *health = StoreHealth::Degraded {
                    since,
                    last_error: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Reload on the configured interval until cancelled.
    ///
    /// Returns immediately when no interval is configured.
    pub async fn run_refresh_worker(self: Arc<Self>, cancel: CancellationToken) {
        let Some(interval) = self.settings.refresh_interval else {
            tracing::debug!(store = self.name(), "Periodic rule refresh disabled");
            return;
        };

        tracing::info!(
            store = self.name(),
            interval_secs = interval.as_secs(),
            "Starting rule refresh worker"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial load already happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(store = self.name(), "Rule refresh worker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    // Failures are logged and reflected in health by invalidate().
                    let _ = self.invalidate().await;
                }
            }
        }
    }
}

async fn fetch_with_retry<L: SnapshotLoader>(
    loader: &L,
    retry: &RetryConfig,
) -> Result<L::Snapshot, StoreError> {
    let max_attempts = retry.max_attempts();
    let mut attempt = 0;

    loop {
        match loader.load().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    store = loader.name(),
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Rule source read failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(LoadError::Db(source)) => {
                return Err(StoreError::Unavailable {
                    store: loader.name(),
                    attempts: attempt + 1,
                    source,
                });
            }
            Err(source) => {
                return Err(StoreError::Invalid {
                    store: loader.name(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        authz::PermissionRuleStore,
        db::tests::memory::MemoryRuleRepo,
        models::{HttpMethod, PermissionRule},
    };

    pub(crate) fn fast_settings() -> StoreSettings {
        StoreSettings {
            retry: RetryConfig {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                jitter: 0.0,
                ..Default::default()
            },
            refresh_interval: None,
        }
    }

    fn repo() -> Arc<MemoryRuleRepo> {
        Arc::new(MemoryRuleRepo::new(
            vec![PermissionRule::new("/applications", HttpMethod::Get).with_roles([4])],
            vec![],
        ))
    }

    async fn store(repo: &Arc<MemoryRuleRepo>) -> PermissionRuleStore {
        PermissionRuleStore::from_repo(repo.clone(), fast_settings())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_loads_generation_one() {
        let repo = repo();
        let store = store(&repo).await;
        assert_eq!(store.generation(), 1);
        assert_eq!(store.snapshot().len(), 1);
        assert!(store.health().is_healthy());
    }

    #[tokio::test]
    async fn test_initialize_fails_closed_when_unavailable() {
        let repo = repo();
        repo.set_failing(true);

        let err = PermissionRuleStore::from_repo(repo.clone(), fast_settings())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "RULE_STORE_UNAVAILABLE");
        assert!(matches!(err, StoreError::Unavailable { attempts: 3, .. }));
        assert_eq!(repo.reads(), 3);
    }

    #[tokio::test]
    async fn test_initialize_retries_transient_failure() {
        let repo = repo();
        repo.set_failing(true);

        let store = {
            let task_repo = repo.clone();
            let handle = tokio::spawn(async move {
                PermissionRuleStore::from_repo(
                    task_repo,
                    StoreSettings {
                        retry: RetryConfig {
                            max_retries: 50,
                            initial_delay_ms: 5,
                            max_delay_ms: 5,
                            jitter: 0.0,
                            ..Default::default()
                        },
                        refresh_interval: None,
                    },
                )
                .await
            });
            tokio::time::sleep(Duration::from_millis(20)).await;
            repo.set_failing(false);
            handle.await.unwrap().unwrap()
        };

        assert_eq!(store.generation(), 1);
        assert!(repo.reads() > 1);
    }

    #[tokio::test]
    async fn test_invalid_rules_are_not_retried() {
        let repo = repo();
        repo.set_permissions(vec![
            PermissionRule::new("/a/{id}", HttpMethod::Get),
            PermissionRule::new("/{x}/b", HttpMethod::Get),
        ]);

        let err = PermissionRuleStore::from_repo(repo.clone(), fast_settings())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Invalid { .. }));
        assert_eq!(repo.reads(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_swaps_snapshot() {
        let repo = repo();
        let store = store(&repo).await;
        let before = store.snapshot();

        repo.set_permissions(vec![
            PermissionRule::new("/applications", HttpMethod::Get).with_roles([4]),
            PermissionRule::new("/applications", HttpMethod::Post).with_roles([3]),
        ]);
        assert_eq!(store.invalidate().await.unwrap(), 2);

        // Snapshots already handed out are unaffected
        assert_eq!(before.len(), 1);
        assert_eq!(before.generation, 1);
        assert_eq!(store.snapshot().len(), 2);
        assert_eq!(store.generation(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_known_good() {
        let repo = repo();
        let store = store(&repo).await;

        repo.set_failing(true);
        let err = store.invalidate().await.unwrap_err();
        assert_eq!(err.code(), "RULE_STORE_UNAVAILABLE");

        assert_eq!(store.generation(), 1);
        assert!(store.get(HttpMethod::Get, "/applications").is_some());
        let StoreHealth::Degraded { since, .. } = store.health() else {
            panic!("store should be degraded");
        };

        // A second failure keeps the original degradation time
        store.invalidate().await.unwrap_err();
        assert!(matches!(store.health(), StoreHealth::Degraded { since: s, .. } if s == since));

        repo.set_failing(false);
        assert_eq!(store.invalidate().await.unwrap(), 2);
        assert!(store.health().is_healthy());
    }

    #[tokio::test]
    async fn test_invalid_refresh_degrades() {
        let repo = repo();
        let store = store(&repo).await;

        repo.set_permissions(vec![
            PermissionRule::new("/x", HttpMethod::Get),
            PermissionRule::new("/x", HttpMethod::Get),
        ]);
        let err = store.invalidate().await.unwrap_err();
        assert_eq!(err.code(), "RULE_STORE_INVALID");
        assert!(!store.health().is_healthy());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_staleness_follows_refresh_interval() {
        let repo = repo();
        let store = PermissionRuleStore::from_repo(
            repo.clone(),
            StoreSettings {
                refresh_interval: Some(Duration::from_secs(60)),
                ..fast_settings()
            },
        )
        .await
        .unwrap();

        let now = Utc::now();
        assert!(!store.is_stale(now));
        assert!(store.is_stale(now + chrono::Duration::seconds(120)));
    }

    #[tokio::test]
    async fn test_refresh_worker_reloads_and_stops() {
        let repo = repo();
        let store = Arc::new(
            PermissionRuleStore::from_repo(
                repo.clone(),
                StoreSettings {
                    refresh_interval: Some(Duration::from_millis(10)),
                    ..fast_settings()
                },
            )
            .await
            .unwrap(),
        );

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(store.clone().run_refresh_worker(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.generation() > 1);

        cancel.cancel();
        worker.await.unwrap();
    }
}

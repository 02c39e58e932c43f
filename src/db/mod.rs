mod error;
pub mod file;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::AccessGateConfig;
#[cfg(feature = "database-sqlite")]
use crate::config::{DatabaseConfig, SqliteConfig};

/// The repositories the rule stores read from.
#[derive(Clone)]
pub struct RuleRepos {
    pub permissions: Arc<dyn PermissionRuleRepo>,
    pub licenses: Arc<dyn LicenseRuleRepo>,
}

impl RuleRepos {
    /// Open the rule source named by the configuration.
    pub async fn from_config(config: &AccessGateConfig) -> DbResult<Self> {
        #[cfg(feature = "database-sqlite")]
        if let Some(DatabaseConfig::Sqlite(cfg)) = &config.database {
            let pool = connect_sqlite(cfg).await?;
            return Ok(Self::from_sqlite(pool));
        }

        match &config.seed {
            Some(seed) => {
                tracing::info!(path = %seed.path.display(), "Using seed file rule source");
                Ok(Self::from_seed_file(&seed.path))
            }
            None => Err(DbError::Internal("no rule source configured".into())),
        }
    }

    pub fn from_seed_file(path: impl Into<std::path::PathBuf>) -> Self {
        let repo = Arc::new(file::FileRuleRepo::new(path));
        Self {
            permissions: repo.clone(),
            licenses: repo,
        }
    }

    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        Self {
            permissions: Arc::new(sqlite::SqlitePermissionRuleRepo::new(pool.clone())),
            licenses: Arc::new(sqlite::SqliteLicenseRuleRepo::new(pool)),
        }
    }
}

/// Open the SQLite pool and run migrations when configured to.
#[cfg(feature = "database-sqlite")]
pub async fn connect_sqlite(cfg: &SqliteConfig) -> DbResult<sqlx::SqlitePool> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&cfg.path)
        .create_if_missing(cfg.create_if_missing)
        .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms));

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(options)
        .await?;

    tracing::info!(path = %cfg.path, "Connected to SQLite rule database");

    if cfg.run_migrations {
        sqlx::migrate!("./migrations_sqlx/sqlite").run(&pool).await?;
        tracing::debug!("SQLite migrations applied");
    }

    Ok(pool)
}

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::parse_id_set;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::PermissionRuleRepo,
    },
    models::{HttpMethod, PermissionRule},
};

pub struct SqlitePermissionRuleRepo {
    pool: SqlitePool,
}

impl SqlitePermissionRuleRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_rule(row: &sqlx::sqlite::SqliteRow) -> DbResult<PermissionRule> {
        let method_str: String = row.get("method");
        let method: HttpMethod = method_str.parse().map_err(DbError::Internal)?;

        let allowed_licenses: String = row.get("allowed_licenses");
        let allowed_roles: String = row.get("allowed_roles");
        let allow_all: i32 = row.get("allow_all");

        Ok(PermissionRule {
            api_path: row.get("api_path"),
            method,
            allowed_licenses: parse_id_set("allowed_licenses", &allowed_licenses)?,
            allowed_roles: parse_id_set("allowed_roles", &allowed_roles)?,
            allow_all: allow_all != 0,
        })
    }
}

#[async_trait]
impl PermissionRuleRepo for SqlitePermissionRuleRepo {
    async fn list_all(&self) -> DbResult<Vec<PermissionRule>> {
        let rows = sqlx::query(
            r#"
            SELECT api_path, method, allowed_licenses, allowed_roles, allow_all
            FROM permissions
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_rule).collect()
    }
}

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::{parse_id_set, parse_quota};
use crate::{
    db::{error::DbResult, repos::LicenseRuleRepo},
    models::{LicenseRule, LicenseTierId},
};

pub struct SqliteLicenseRuleRepo {
    pool: SqlitePool,
}

impl SqliteLicenseRuleRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_rule(row: &sqlx::sqlite::SqliteRow) -> DbResult<LicenseRule> {
        let standards: Option<String> = row.get("available_standards");
        let templates: Option<String> = row.get("available_templates");

        Ok(LicenseRule {
            license_tier_id: LicenseTierId(row.get("license_type_id")),
            max_applications: parse_quota(
                "number_of_applications",
                row.get("number_of_applications"),
            )?,
            max_assessments: parse_quota("number_of_assessments", row.get("number_of_assessments"))?,
            max_standards_per_application: parse_quota(
                "standards_per_application",
                row.get("standards_per_application"),
            )?,
            available_standard_ids: standards
                .map(|raw| parse_id_set("available_standards", &raw))
                .transpose()?,
            available_template_ids: templates
                .map(|raw| parse_id_set("available_templates", &raw))
                .transpose()?,
        })
    }
}

#[async_trait]
impl LicenseRuleRepo for SqliteLicenseRuleRepo {
    async fn list_all(&self) -> DbResult<Vec<LicenseRule>> {
        let rows = sqlx::query(
            r#"
            SELECT license_type_id, number_of_applications, number_of_assessments,
                   standards_per_application, available_standards, available_templates
            FROM license_rules
            ORDER BY license_type_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_rule).collect()
    }
}

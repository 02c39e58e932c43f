//! Rule source backed by a TOML file.
//!
//! ```toml
//! [[permissions]]
//! api_path = "/applications/{id}"
//! method = "GET"
//! allowed_roles = [3, 4]
//! allowed_licenses = [1, 2]
//!
//! [[license_rules]]
//! license_tier_id = 1
//! max_applications = 5
//! available_standard_ids = [1, 2, 3]
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    error::{DbError, DbResult},
    repos::{LicenseRuleRepo, PermissionRuleRepo},
};
use crate::models::{LicenseRule, PermissionRule};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedFile {
    #[serde(default)]
    permissions: Vec<PermissionRule>,
    #[serde(default)]
    license_rules: Vec<LicenseRule>,
}

/// Reads both rule tables from one TOML file, re-reading it on every load.
pub struct FileRuleRepo {
    path: PathBuf,
}

impl FileRuleRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> DbResult<SeedFile> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DbError::Seed(format!("failed to read {}: {}", self.path.display(), e)))?;
        toml::from_str(&contents)
            .map_err(|e| DbError::Seed(format!("failed to parse {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl PermissionRuleRepo for FileRuleRepo {
    async fn list_all(&self) -> DbResult<Vec<PermissionRule>> {
        Ok(self.read().await?.permissions)
    }
}

#[async_trait]
impl LicenseRuleRepo for FileRuleRepo {
    async fn list_all(&self) -> DbResult<Vec<LicenseRule>> {
        Ok(self.read().await?.license_rules)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::models::{HttpMethod, LicenseTierId, RoleId, StandardId};

    fn write_seed(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_both_tables() {
        let file = write_seed(
            r#"
            [[permissions]]
            api_path = "/applications/{id}"
            method = "GET"
            allowed_roles = [3, 4]

            [[permissions]]
            api_path = "/health"
            method = "GET"
            allow_all = true

            [[license_rules]]
            license_tier_id = 1
            max_applications = 5
            available_standard_ids = [1, 2]
            "#,
        );
        let repo = FileRuleRepo::new(file.path());

        let permissions = PermissionRuleRepo::list_all(&repo).await.unwrap();
        assert_eq!(permissions.len(), 2);
        assert_eq!(permissions[0].method, HttpMethod::Get);
        assert!(permissions[0].allowed_roles.contains(&RoleId(4)));
        assert!(permissions[1].allow_all);

        let licenses = LicenseRuleRepo::list_all(&repo).await.unwrap();
        assert_eq!(licenses.len(), 1);
        assert_eq!(licenses[0].license_tier_id, LicenseTierId(1));
        assert_eq!(licenses[0].max_applications, Some(5));
        assert_eq!(licenses[0].max_assessments, None);
        assert!(licenses[0].standard_available(StandardId(2)));
        assert!(!licenses[0].standard_available(StandardId(3)));
    }

    #[tokio::test]
    async fn test_edits_are_picked_up_on_next_read() {
        let mut file = write_seed(
            r#"
            [[permissions]]
            api_path = "/health"
            method = "GET"
            allow_all = true
            "#,
        );
        let repo = FileRuleRepo::new(file.path());
        assert_eq!(PermissionRuleRepo::list_all(&repo).await.unwrap().len(), 1);

        file.write_all(
            br#"
            [[permissions]]
            api_path = "/reports"
            method = "GET"
            allowed_licenses = [2]
            "#,
        )
        .unwrap();
        file.flush().unwrap();
        assert_eq!(PermissionRuleRepo::list_all(&repo).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let repo = FileRuleRepo::new("/nonexistent/accessgate/rules.toml");
        let err = PermissionRuleRepo::list_all(&repo).await.unwrap_err();
        assert!(matches!(err, DbError::Seed(_)));
    }

    #[tokio::test]
    async fn test_unknown_fields_rejected() {
        let file = write_seed(
            r#"
            [[permissions]]
            api_path = "/health"
            method = "GET"
            allow_everyone = true
            "#,
        );
        let repo = FileRuleRepo::new(file.path());
        assert!(PermissionRuleRepo::list_all(&repo).await.is_err());
    }
}

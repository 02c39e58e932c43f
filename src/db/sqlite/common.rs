use serde::de::DeserializeOwned;

use crate::db::error::{DbError, DbResult};

/// Parse a JSON array column into a collection of ids.
pub fn parse_id_set<T: DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::Internal(format!("Invalid JSON in column {}: {}", column, e)))
}

/// Convert a nullable integer quota column, rejecting negative values.
pub fn parse_quota(column: &str, raw: Option<i64>) -> DbResult<Option<u32>> {
    raw.map(|value| {
        u32::try_from(value).map_err(|_| {
            DbError::Internal(format!("Invalid quota {} in column {}", value, column))
        })
    })
    .transpose()
}

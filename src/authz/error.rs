//! Authorization errors.
//!
//! Everything here is a load-time configuration or infrastructure error.
//! Request-time denials are values (`DenyReason`), never errors.

use thiserror::Error;

use crate::{
    db::DbError,
    models::{HttpMethod, LicenseTierId, RoleId},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("path template '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("path template '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("path template '{template}' has a malformed placeholder segment '{segment}'")]
    InvalidPlaceholder { template: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleIndexError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("duplicate permission rule for {method} {template}")]
    Duplicate {
        method: HttpMethod,
        template: String,
    },

    #[error(
        "permission rules for {method} {first} and {method} {second} match the same paths \
         with equal specificity"
    )]
    Ambiguous {
        method: HttpMethod,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("role {0} is declared more than once")]
    DuplicateRole(RoleId),

    #[error("role {role} implies undeclared role {implied}")]
    UnknownRole { role: RoleId, implied: RoleId },

    #[error("role hierarchy contains a cycle: {}", format_cycle(.0))]
    Cycle(Vec<RoleId>),
}

fn format_cycle(roles: &[RoleId]) -> String {
    roles
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure to produce a snapshot from the backing source.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source could not be read. Retried.
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Rules(#[from] RuleIndexError),

    #[error("duplicate license rule for tier {0}")]
    DuplicateLicenseTier(LicenseTierId),
}

impl LoadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Db(_))
    }
}

/// Rule store failure surfaced to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        store: &'static str,
        attempts: u32,
        #[source]
        source: DbError,
    },

    #[error("{store} contains invalid rules: {source}")]
    Invalid {
        store: &'static str,
        #[source]
        source: LoadError,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "RULE_STORE_UNAVAILABLE",
            StoreError::Invalid { .. } => "RULE_STORE_INVALID",
        }
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{LicenseTierId, RoleId};

/// HTTP methods a permission rule can be declared for.
///
/// Requests using any other method never match a rule and are denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(format!("Unsupported HTTP method: {}", s)),
        }
    }
}

impl TryFrom<&http::Method> for HttpMethod {
    type Error = String;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// Permission rule binding a path template and method to the roles and
/// license tiers allowed to call it.
///
/// Empty `allowed_roles` or `allowed_licenses` means that dimension is not
/// restricted. `allow_all` grants access regardless of either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionRule {
    /// Path template, e.g. `/applications/{id}/assessments`
    pub api_path: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub allowed_licenses: BTreeSet<LicenseTierId>,
    #[serde(default)]
    pub allowed_roles: BTreeSet<RoleId>,
    #[serde(default)]
    pub allow_all: bool,
}

impl PermissionRule {
    pub fn new(api_path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            api_path: api_path.into(),
            method,
            allowed_licenses: BTreeSet::new(),
            allowed_roles: BTreeSet::new(),
            allow_all: false,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = i32>) -> Self {
        self.allowed_roles = roles.into_iter().map(RoleId).collect();
        self
    }

    pub fn with_licenses(mut self, tiers: impl IntoIterator<Item = i32>) -> Self {
        self.allowed_licenses = tiers.into_iter().map(LicenseTierId).collect();
        self
    }

    pub fn allowing_all(mut self) -> Self {
        self.allow_all = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_is_case_sensitive() {
        assert_eq!("PATCH".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert!("get".parse::<HttpMethod>().is_err());
        assert!("HEAD".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn method_from_http_method() {
        assert_eq!(
            HttpMethod::try_from(&http::Method::DELETE),
            Ok(HttpMethod::Delete)
        );
        assert!(HttpMethod::try_from(&http::Method::TRACE).is_err());
    }

    #[test]
    fn rule_deserializes_with_defaults() {
        let rule: PermissionRule =
            serde_json::from_str(r#"{"api_path": "/health", "method": "GET"}"#).unwrap();
        assert!(rule.allowed_roles.is_empty());
        assert!(rule.allowed_licenses.is_empty());
        assert!(!rule.allow_all);
    }
}

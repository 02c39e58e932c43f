use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount the `/admin` routes (rule invalidation).
    /// These routes are unauthenticated and must only be reachable from
    /// trusted networks.
    #[serde(default = "default_true")]
    pub admin_routes: bool,

    /// Header carrying the request id propagated through logs.
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_routes: true,
            request_id_header: default_request_id_header(),
        }
    }
}

impl ServerConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if http::HeaderName::from_bytes(self.request_id_header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "server.request_id_header '{}' is not a valid header name",
                self.request_id_header
            )));
        }
        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

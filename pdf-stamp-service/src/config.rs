//! Service configuration loaded at startup from files and environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Service configuration. Read once at startup, never from request handlers.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default = "default_fetch")]
    pub fetch: FetchConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for a whole request, including remote image fetches
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Shared-secret authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Required. Compared against the `x-api-key` header or the `apiKey` body field.
    #[serde(default)]
    pub api_key: String,
}

/// Remote image fetching
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Request limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body size (multipart or JSON)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServiceConfig {
    /// Load configuration from `.env`, an optional `config` file, and
    /// `PDFSTAMP__*` environment variables.
    ///
    /// The bare `API_KEY` and `PORT` variables are honoured as overrides so
    /// existing deployments keep working.
    pub fn load() -> ServiceResult<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "Failed to read .env file");
        }

        let config: ServiceConfig = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("PDFSTAMP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.api_key", std::env::var("API_KEY").ok())
            .and_then(|b| {
                b.set_override_option(
                    "server.port",
                    std::env::var("PORT")
                        .ok()
                        .and_then(|p| p.parse::<u16>().ok())
                        .map(i64::from),
                )
            })
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to apply overrides: {}", e),
            })?
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ServiceResult<()> {
        if self.auth.api_key.trim().is_empty() {
            return Err(ServiceError::Config {
                message: "auth.api_key (or API_KEY) must be set".to_string(),
            });
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ServiceError::Config {
                message: "fetch.timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_fetch() -> FetchConfig {
    FetchConfig {
        timeout_secs: default_fetch_timeout_secs(),
        max_image_bytes: default_max_image_bytes(),
        user_agent: default_user_agent(),
    }
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_max_image_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("pdf-stamp-service/{}", env!("CARGO_PKG_VERSION"))
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_body_bytes: default_max_body_bytes(),
    }
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

#[cfg(test)]
impl ServiceConfig {
    /// Defaults with the given API key, for tests.
    pub fn for_tests(api_key: &str) -> Self {
        Self {
            server: default_server(),
            auth: AuthConfig {
                api_key: api_key.to_string(),
            },
            fetch: default_fetch(),
            limits: default_limits(),
        }
    }
}

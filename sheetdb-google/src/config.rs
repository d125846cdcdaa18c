//! Google backend configuration.
//!
//! Loaded from environment variables or a TOML file, then checked with
//! [`GoogleConfig::validate`] before a client is built.

use crate::auth::SCOPE_SPREADSHEETS;
use serde::{Deserialize, Serialize};
use sheetdb_core::ConfigError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_QUERY_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// GOOGLE CONFIG
// ============================================================================

/// Settings for [`crate::GoogleSheetsClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    /// Path to the service-account JSON key.
    pub credentials_path: PathBuf,

    /// OAuth scopes requested for the access token.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,

    #[serde(default = "default_sheets_base_url")]
    pub sheets_base_url: String,

    /// Base of the visualization query endpoint (`<base>/<id>/gviz/tq`).
    #[serde(default = "default_query_base_url")]
    pub query_base_url: String,
}

fn default_scopes() -> Vec<String> {
    vec![SCOPE_SPREADSHEETS.to_string()]
}

fn default_request_timeout() -> Duration {
    Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
}

fn default_sheets_base_url() -> String {
    DEFAULT_SHEETS_BASE_URL.to_string()
}

fn default_query_base_url() -> String {
    DEFAULT_QUERY_BASE_URL.to_string()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

impl GoogleConfig {
    /// Config with defaults for everything but the key path.
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            scopes: default_scopes(),
            request_timeout: default_request_timeout(),
            sheets_base_url: default_sheets_base_url(),
            query_base_url: default_query_base_url(),
        }
    }

    /// Build from environment variables.
    ///
    /// - `SHEETDB_GOOGLE_CREDENTIALS`: service-account key path (required)
    /// - `SHEETDB_GOOGLE_SCOPES`: comma-separated scopes (default: spreadsheets)
    /// - `SHEETDB_REQUEST_TIMEOUT_MS`: HTTP timeout (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials_path = std::env::var("SHEETDB_GOOGLE_CREDENTIALS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "SHEETDB_GOOGLE_CREDENTIALS".to_string(),
            })?;

        let scopes = std::env::var("SHEETDB_GOOGLE_SCOPES")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_scopes);

        let request_timeout = match std::env::var("SHEETDB_REQUEST_TIMEOUT_MS") {
            Ok(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    field: "SHEETDB_REQUEST_TIMEOUT_MS".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
                Duration::from_millis(ms)
            }
            Err(_) => default_request_timeout(),
        };

        let config = Self {
            credentials_path: PathBuf::from(credentials_path),
            scopes,
            request_timeout,
            sheets_base_url: default_sheets_base_url(),
            query_base_url: default_query_base_url(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text. Unknown keys are rejected.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "credentials_path".to_string(),
            });
        }
        if self.scopes.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "scopes".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, url) in [
            ("sheets_base_url", &self.sheets_base_url),
            ("query_base_url", &self.query_base_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: url.clone(),
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }
        Ok(())
    }
}

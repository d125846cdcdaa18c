//! SheetDB Google - Sheets v4 Backend
//!
//! [`GoogleSheetsClient`] implements [`sheetdb_backend::SheetsBackend`]
//! against the Google Sheets REST API, authenticated as a service account.
//!
//! ```no_run
//! # async fn demo() -> sheetdb_core::SheetDbResult<()> {
//! use sheetdb_google::{GoogleConfig, GoogleSheetsClient};
//!
//! let config = GoogleConfig::from_env()?;
//! let client = GoogleSheetsClient::from_config(&config)?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;

pub use auth::{
    AssertionClaims, FixedClock, ServiceAccountAuth, ServiceAccountKey, SystemClock, TokenClock,
    DEFAULT_TOKEN_URI, SCOPE_DRIVE_FILE, SCOPE_SPREADSHEETS, SCOPE_SPREADSHEETS_READONLY,
};
pub use client::GoogleSheetsClient;
pub use config::GoogleConfig;

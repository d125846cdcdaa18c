//! Store configuration.

use crate::column::{is_column_identifier, MAX_COLUMN, ROW_INDEX_COLUMN};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the KV store lays out writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvMode {
    /// One row per key, overwritten in place.
    #[default]
    Default,
    /// Every write appends a row; the highest `_ts` wins on read.
    AppendOnly,
}

/// Encoding applied to KV values before they reach the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    #[default]
    Basic,
    Base64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvStoreConfig {
    #[serde(default)]
    pub mode: KvMode,
    #[serde(default)]
    pub codec: CodecKind,
}

impl KvStoreConfig {
    pub fn append_only() -> Self {
        Self {
            mode: KvMode::AppendOnly,
            ..Self::default()
        }
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowStoreConfig {
    /// User columns, left to right. The row-index column is added in front.
    pub columns: Vec<String>,
}

impl RowStoreConfig {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.columns.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "columns".to_string(),
            });
        }
        if self.columns.len() + 1 > MAX_COLUMN {
            return Err(ConfigError::InvalidValue {
                field: "columns".to_string(),
                value: self.columns.len().to_string(),
                reason: format!("at most {} columns are supported", MAX_COLUMN - 1),
            });
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "columns".to_string(),
                    value: column.clone(),
                    reason: "must not be empty".to_string(),
                });
            }
            if column == ROW_INDEX_COLUMN {
                return Err(ConfigError::InvalidValue {
                    field: "columns".to_string(),
                    value: column.clone(),
                    reason: "name is reserved".to_string(),
                });
            }
            if !is_column_identifier(column) {
                return Err(ConfigError::InvalidValue {
                    field: "columns".to_string(),
                    value: column.clone(),
                    reason: "must be letters, digits and underscores, not starting with a digit"
                        .to_string(),
                });
            }
            if !seen.insert(column.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "columns".to_string(),
                    value: column.clone(),
                    reason: "duplicate column".to_string(),
                });
            }
        }
        Ok(())
    }
}

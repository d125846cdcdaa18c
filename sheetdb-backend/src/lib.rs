//! SheetDB Backend - Spreadsheet Capability Trait
//!
//! Defines the narrow set of spreadsheet operations the stores need.
//! `MemorySheets` implements it in-process for tests and local use; the
//! Google Sheets client lives in `sheetdb-google`.

pub mod memory;

pub use memory::MemorySheets;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sheetdb_core::{BackendResult, CellValue};
use std::collections::HashMap;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Outcome of an append (`insert_rows` / `overwrite_rows`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertRowsResult {
    /// Range the rows actually landed in, sheet-qualified.
    pub updated_range: String,
    pub updated_rows: u64,
    pub updated_columns: u64,
    pub updated_cells: u64,
    /// Computed values of the written cells.
    pub inserted_values: Vec<Vec<CellValue>>,
}

/// Outcome of an in-place write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRowsResult {
    pub updated_range: String,
    pub updated_rows: u64,
    pub updated_columns: u64,
    pub updated_cells: u64,
    /// Computed values of the written cells; formulas come back evaluated.
    pub updated_values: Vec<Vec<CellValue>>,
}

/// One range of a batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdateRowsRequest {
    pub range: String,
    pub values: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdateRowsResult {
    pub responses: Vec<UpdateRowsResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRowsResult {
    pub rows: Vec<Vec<CellValue>>,
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Spreadsheet operations used by the stores.
///
/// Ranges are A1 notation, sheet-qualified. Written text starting with `=`
/// is a formula; every write uses user-entered semantics, and every read
/// returns computed, unformatted values.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// Create a spreadsheet and return its id.
    async fn create_spreadsheet(&self, title: &str) -> BackendResult<String>;

    /// Sheet names mapped to their numeric ids.
    async fn sheet_ids(&self, spreadsheet_id: &str) -> BackendResult<HashMap<String, i64>>;

    /// Add a sheet. Fails with `SheetExists` if the name is taken.
    async fn create_sheet(&self, spreadsheet_id: &str, name: &str) -> BackendResult<()>;

    async fn delete_sheets(&self, spreadsheet_id: &str, sheet_ids: &[i64]) -> BackendResult<()>;

    /// Append rows after the last non-empty row of `range`.
    async fn insert_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult>;

    /// Append rows into existing empty cells of `range` without inserting.
    async fn overwrite_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult>;

    /// Write rows starting at the top-left of `range`.
    async fn update_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<UpdateRowsResult>;

    async fn batch_update_rows(
        &self,
        spreadsheet_id: &str,
        requests: Vec<BatchUpdateRowsRequest>,
    ) -> BackendResult<BatchUpdateRowsResult>;

    /// Read computed values. Trailing empty rows and cells are omitted.
    async fn get_rows(&self, spreadsheet_id: &str, range: &str) -> BackendResult<Vec<Vec<CellValue>>>;

    /// Run a query-language statement over a whole sheet.
    async fn query_rows(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        query: &str,
        skip_header: bool,
    ) -> BackendResult<QueryRowsResult>;

    /// Clear values in `ranges`; returns the ranges cleared.
    async fn clear(&self, spreadsheet_id: &str, ranges: &[String]) -> BackendResult<Vec<String>>;
}

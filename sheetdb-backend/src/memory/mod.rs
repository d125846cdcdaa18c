//! In-memory spreadsheet backend.
//!
//! Keeps entered values per sheet and computes formulas on read, so the
//! stores' formula templates and queries run unchanged in tests. Writes use
//! user-entered semantics: numeric and boolean text is typed, `=` text is a
//! formula. Faults can be queued per operation with [`MemorySheets::fail_next`].

mod formula;
mod grid;
mod query;

use crate::{
    BatchUpdateRowsRequest, BatchUpdateRowsResult, InsertRowsResult, QueryRowsResult,
    SheetsBackend, UpdateRowsResult,
};
use async_trait::async_trait;
use formula::Evaluator;
use grid::Grid;
use sheetdb_core::{A1Range, BackendError, BackendResult, CellValue};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

// ============================================================================
// WORKBOOK MODEL
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct Sheet {
    pub id: i64,
    pub name: String,
    pub grid: Grid,
}

impl Sheet {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            grid: Grid::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Spreadsheet {
    pub title: String,
    sheets: Vec<Sheet>,
    next_sheet_id: i64,
}

impl Spreadsheet {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            sheets: Vec::new(),
            next_sheet_id: 0,
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn add_sheet(&mut self, name: &str) -> i64 {
        let id = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.sheets.push(Sheet::new(id, name));
        id
    }

    /// Sheet named by `range`, or the first sheet for unqualified ranges.
    fn target(&self, range: &A1Range) -> BackendResult<&Sheet> {
        match &range.sheet {
            Some(name) => self.sheet(name).ok_or_else(|| BackendError::SheetNotFound {
                sheet: name.clone(),
            }),
            None => self.sheets.first().ok_or_else(|| BackendError::SheetNotFound {
                sheet: String::new(),
            }),
        }
    }

    fn target_mut(&mut self, range: &A1Range) -> BackendResult<&mut Sheet> {
        match &range.sheet {
            Some(name) => {
                let name = name.clone();
                self.sheet_mut(&name)
                    .ok_or(BackendError::SheetNotFound { sheet: name })
            }
            None => self
                .sheets
                .first_mut()
                .ok_or_else(|| BackendError::SheetNotFound {
                    sheet: String::new(),
                }),
        }
    }
}

/// Store `value` the way a spreadsheet stores user-entered input. A leading
/// apostrophe keeps the rest as literal text.
fn enter(grid: &mut Grid, row: u32, col: usize, value: CellValue) {
    match value {
        CellValue::Text(text) if text.starts_with('\'') => {
            grid.set_literal(row, col, text[1..].to_string())
        }
        other => grid.set(row, col, user_entered(other)),
    }
}

/// Typed the way a spreadsheet types user-entered input.
fn user_entered(value: CellValue) -> CellValue {
    let CellValue::Text(text) = value else {
        return value;
    };
    if text.is_empty() {
        return CellValue::Null;
    }
    if text.starts_with('=') {
        return CellValue::Text(text);
    }
    if text.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    let numeric = text.trim();
    let looks_numeric = !numeric.is_empty()
        && numeric.chars().any(|c| c.is_ascii_digit())
        && numeric
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if looks_numeric {
        if let Ok(n) = numeric.parse::<f64>() {
            return CellValue::Number(n);
        }
    }
    CellValue::Text(text)
}

fn trim_trailing(mut rows: Vec<Vec<CellValue>>) -> Vec<Vec<CellValue>> {
    for row in &mut rows {
        while row.last().is_some_and(CellValue::is_blank) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
    rows
}

fn not_found(spreadsheet_id: &str) -> BackendError {
    BackendError::SpreadsheetNotFound {
        spreadsheet_id: spreadsheet_id.to_string(),
    }
}

fn bad_request(message: impl Into<String>) -> BackendError {
    BackendError::Api {
        status: 400,
        message: message.into(),
    }
}

// ============================================================================
// MEMORY BACKEND
// ============================================================================

#[derive(Debug, Default)]
struct State {
    spreadsheets: HashMap<String, Spreadsheet>,
    next_id: u64,
}

/// In-memory [`SheetsBackend`].
#[derive(Debug, Default)]
pub struct MemorySheets {
    state: RwLock<State>,
    faults: Mutex<HashMap<&'static str, VecDeque<BackendError>>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `operation` (e.g. `"update_rows"`) fail with
    /// `error`. Queued faults fire in order, one per call.
    pub async fn fail_next(&self, operation: &'static str, error: BackendError) {
        self.faults
            .lock()
            .await
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Number of queued faults not yet fired.
    pub async fn pending_faults(&self) -> usize {
        self.faults.lock().await.values().map(VecDeque::len).sum()
    }

    pub async fn spreadsheet_title(&self, spreadsheet_id: &str) -> BackendResult<String> {
        let state = self.state.read().await;
        state
            .spreadsheets
            .get(spreadsheet_id)
            .map(|book| book.title.clone())
            .ok_or_else(|| not_found(spreadsheet_id))
    }

    /// Entered (unevaluated) values of `range`, formulas as written.
    pub async fn raw_rows(&self, spreadsheet_id: &str, range: &str) -> BackendResult<Vec<Vec<CellValue>>> {
        let range = A1Range::parse(range)?;
        let state = self.state.read().await;
        let book = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        let sheet = book.target(&range)?;
        let end = sheet.grid.effective_end(&range);
        let rows = (range.start_row..=end)
            .map(|row| {
                (range.start_col..=range.end_col)
                    .map(|col| sheet.grid.get(row, col).clone())
                    .collect()
            })
            .collect();
        Ok(trim_trailing(rows))
    }

    async fn take_fault(&self, operation: &'static str) -> BackendResult<()> {
        let mut faults = self.faults.lock().await;
        match faults.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => {
                trace!(operation, error = %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn append(
        &self,
        operation: &'static str,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult> {
        self.take_fault(operation).await?;
        let target = A1Range::parse(range)?;
        let mut state = self.state.write().await;
        let book = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;

        let start_row = {
            let sheet = book.target(&target)?;
            sheet
                .grid
                .last_used_row_in(&target)
                .map(|r| r + 1)
                .unwrap_or(target.start_row)
        };
        let at = A1Range {
            start_row,
            end_row: None,
            ..target
        };
        let result = write_rows(book, &at, rows)?;
        trace!(operation, range, updated_range = %result.updated_range, "append");
        Ok(InsertRowsResult {
            updated_range: result.updated_range,
            updated_rows: result.updated_rows,
            updated_columns: result.updated_columns,
            updated_cells: result.updated_cells,
            inserted_values: result.updated_values,
        })
    }
}

/// Write `rows` at the top-left of `range`, returning the computed values.
fn write_rows(
    book: &mut Spreadsheet,
    range: &A1Range,
    rows: Vec<Vec<CellValue>>,
) -> BackendResult<UpdateRowsResult> {
    let height = rows.len() as u32;
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width > range.width() {
        return Err(bad_request(format!(
            "range {} is {} columns wide, tried writing {}",
            range,
            range.width(),
            width
        )));
    }
    if let Some(end) = range.end_row {
        if height > 0 && range.start_row + height - 1 > end {
            return Err(bad_request(format!(
                "range {} ends at row {}, tried writing to row {}",
                range,
                end,
                range.start_row + height - 1
            )));
        }
    }

    let sheet = book.target_mut(range)?;
    let sheet_name = sheet.name.clone();
    for (r, row) in rows.into_iter().enumerate() {
        for (c, value) in row.into_iter().enumerate() {
            enter(&mut sheet.grid, range.start_row + r as u32, range.start_col + c, value);
        }
    }

    if height == 0 || width == 0 {
        return Ok(UpdateRowsResult {
            updated_range: A1Range::cell(Some(&sheet_name), range.start_col, range.start_row)
                .to_string(),
            ..UpdateRowsResult::default()
        });
    }

    let written = A1Range {
        sheet: Some(sheet_name.clone()),
        start_col: range.start_col,
        start_row: range.start_row,
        end_col: range.start_col + width - 1,
        end_row: Some(range.start_row + height - 1),
    };
    let sheet = book.target(&written)?;
    let values = Evaluator::new(book).range_values(sheet, &written, 0);

    Ok(UpdateRowsResult {
        updated_range: written.to_string(),
        updated_rows: u64::from(height),
        updated_columns: width as u64,
        updated_cells: u64::from(height) * width as u64,
        updated_values: values,
    })
}

#[async_trait]
impl SheetsBackend for MemorySheets {
    async fn create_spreadsheet(&self, title: &str) -> BackendResult<String> {
        self.take_fault("create_spreadsheet").await?;
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        let mut book = Spreadsheet::new(title);
        book.add_sheet("Sheet1");
        state.spreadsheets.insert(id.clone(), book);
        trace!(spreadsheet_id = %id, title, "create_spreadsheet");
        Ok(id)
    }

    async fn sheet_ids(&self, spreadsheet_id: &str) -> BackendResult<HashMap<String, i64>> {
        self.take_fault("sheet_ids").await?;
        let state = self.state.read().await;
        let book = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        Ok(book.sheets.iter().map(|s| (s.name.clone(), s.id)).collect())
    }

    async fn create_sheet(&self, spreadsheet_id: &str, name: &str) -> BackendResult<()> {
        self.take_fault("create_sheet").await?;
        let mut state = self.state.write().await;
        let book = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        if book.sheet(name).is_some() {
            return Err(BackendError::SheetExists {
                sheet: name.to_string(),
            });
        }
        let id = book.add_sheet(name);
        trace!(spreadsheet_id, sheet = name, sheet_id = id, "create_sheet");
        Ok(())
    }

    async fn delete_sheets(&self, spreadsheet_id: &str, sheet_ids: &[i64]) -> BackendResult<()> {
        self.take_fault("delete_sheets").await?;
        let mut state = self.state.write().await;
        let book = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        if let Some(missing) = sheet_ids
            .iter()
            .find(|id| !book.sheets.iter().any(|s| s.id == **id))
        {
            return Err(BackendError::SheetNotFound {
                sheet: missing.to_string(),
            });
        }
        book.sheets.retain(|s| !sheet_ids.contains(&s.id));
        trace!(spreadsheet_id, ?sheet_ids, "delete_sheets");
        Ok(())
    }

    async fn insert_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult> {
        self.append("insert_rows", spreadsheet_id, range, rows).await
    }

    async fn overwrite_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult> {
        self.append("overwrite_rows", spreadsheet_id, range, rows).await
    }

    async fn update_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<UpdateRowsResult> {
        self.take_fault("update_rows").await?;
        let target = A1Range::parse(range)?;
        let mut state = self.state.write().await;
        let book = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        let result = write_rows(book, &target, rows)?;
        trace!(range, updated_range = %result.updated_range, "update_rows");
        Ok(result)
    }

    async fn batch_update_rows(
        &self,
        spreadsheet_id: &str,
        requests: Vec<BatchUpdateRowsRequest>,
    ) -> BackendResult<BatchUpdateRowsResult> {
        self.take_fault("batch_update_rows").await?;
        let targets = requests
            .iter()
            .map(|r| A1Range::parse(&r.range))
            .collect::<BackendResult<Vec<_>>>()?;

        let mut state = self.state.write().await;
        let book = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        for target in &targets {
            book.target(target)?;
        }

        let mut responses = Vec::with_capacity(requests.len());
        for (target, request) in targets.iter().zip(requests) {
            responses.push(write_rows(book, target, request.values)?);
        }
        trace!(spreadsheet_id, ranges = responses.len(), "batch_update_rows");
        Ok(BatchUpdateRowsResult { responses })
    }

    async fn get_rows(&self, spreadsheet_id: &str, range: &str) -> BackendResult<Vec<Vec<CellValue>>> {
        self.take_fault("get_rows").await?;
        let target = A1Range::parse(range)?;
        let state = self.state.read().await;
        let book = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        let sheet = book.target(&target)?;
        let rows = Evaluator::new(book).range_values(sheet, &target, 0);
        trace!(range, rows = rows.len(), "get_rows");
        Ok(trim_trailing(rows))
    }

    async fn query_rows(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        query: &str,
        skip_header: bool,
    ) -> BackendResult<QueryRowsResult> {
        self.take_fault("query_rows").await?;
        let state = self.state.read().await;
        let book = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        let sheet = book.sheet(sheet_name).ok_or_else(|| BackendError::SheetNotFound {
            sheet: sheet_name.to_string(),
        })?;

        let start_row = if skip_header { 2 } else { 1 };
        let whole = A1Range {
            sheet: None,
            start_col: 0,
            start_row,
            end_col: sheet
                .grid
                .used_width()
                .max(1)
                .saturating_sub(1),
            end_row: None,
        };
        let table = Evaluator::new(book).range_values(sheet, &whole, 0);
        let rows = query::execute(&table, query).map_err(|reason| {
            bad_request(format!("Invalid query {:?}: {}", query, reason))
        })?;
        trace!(sheet = sheet_name, query, rows = rows.len(), "query_rows");
        Ok(QueryRowsResult { rows })
    }

    async fn clear(&self, spreadsheet_id: &str, ranges: &[String]) -> BackendResult<Vec<String>> {
        self.take_fault("clear").await?;
        let targets = ranges
            .iter()
            .map(|r| A1Range::parse(r))
            .collect::<BackendResult<Vec<_>>>()?;

        let mut state = self.state.write().await;
        let book = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        for target in &targets {
            book.target(target)?;
        }

        let mut cleared = Vec::with_capacity(targets.len());
        for target in targets {
            let sheet = book.target_mut(&target)?;
            sheet.grid.clear(&target);
            cleared.push(
                A1Range {
                    sheet: Some(sheet.name.clone()),
                    ..target
                }
                .to_string(),
            );
        }
        trace!(spreadsheet_id, ?cleared, "clear");
        Ok(cleared)
    }
}

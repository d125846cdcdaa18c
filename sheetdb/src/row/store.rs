use super::stmt::{CountStmt, DeleteStmt, InsertStmt, SelectStmt, UpdateStmt};
use crate::scratchpad::Scratchpad;
use crate::{ensure_sheet, OpContext};
use serde_json::Value;
use sheetdb_backend::SheetsBackend;
use sheetdb_core::{
    a1_range, array_column, row_exists_interceptor, BackendError, CellValue, ColumnMapping,
    ProtocolError, QueryBuilder, Record, RowStoreConfig, SheetDbError, SheetDbResult,
    MAX_COLUMN, NA_VALUE, ROW_HEADER_RANGE, ROW_INDEX_COLUMN, ROW_TABLE_RANGE,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle on one row-store sheet.
pub struct RowStore {
    pub(super) backend: Arc<dyn SheetsBackend>,
    pub(super) spreadsheet_id: String,
    pub(super) sheet: String,
    pub(super) mapping: ColumnMapping,
    scratchpad: Scratchpad,
}

impl fmt::Debug for RowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStore")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet", &self.sheet)
            .field("mapping", &self.mapping)
            .field("scratchpad", &self.scratchpad)
            .finish_non_exhaustive()
    }
}

impl RowStore {
    /// Open (creating if needed) the row store in `sheet` with the column
    /// layout of `config`.
    pub async fn open(
        ctx: &OpContext,
        backend: Arc<dyn SheetsBackend>,
        spreadsheet_id: &str,
        sheet: &str,
        config: RowStoreConfig,
    ) -> SheetDbResult<Self> {
        config.validate()?;
        let mapping = ColumnMapping::for_row_store(&config.columns)?;

        let created = ensure_sheet(ctx, backend.as_ref(), spreadsheet_id, sheet).await?;

        let header_range = a1_range(sheet, ROW_HEADER_RANGE);
        let header = ctx
            .call(
                "get_rows",
                &header_range,
                backend.get_rows(spreadsheet_id, &header_range),
            )
            .await?;
        match header.into_iter().next() {
            None => {
                let cells = mapping.names().iter().map(|n| CellValue::from(n.as_str())).collect();
                ctx.call(
                    "overwrite_rows",
                    &header_range,
                    backend.overwrite_rows(spreadsheet_id, &header_range, vec![cells]),
                )
                .await?;
            }
            Some(existing) => {
                let existing: Vec<String> = existing.iter().map(ToString::to_string).collect();
                if existing != mapping.names() {
                    warn!(
                        sheet,
                        ?existing,
                        expected = ?mapping.names(),
                        "header does not match the configured columns"
                    );
                }
            }
        }

        let scratchpad = Scratchpad::open(ctx, backend.clone(), spreadsheet_id, sheet).await?;
        info!(
            sheet,
            created,
            columns = mapping.len() - 1,
            cell = scratchpad.eval_cell(),
            "row store opened"
        );
        Ok(Self {
            backend,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet: sheet.to_string(),
            mapping,
            scratchpad,
        })
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// User columns in physical order.
    pub fn columns(&self) -> Vec<String> {
        self.mapping
            .names()
            .iter()
            .filter(|n| n.as_str() != ROW_INDEX_COLUMN)
            .cloned()
            .collect()
    }

    /// Read `columns` of live rows. No columns selects every user column.
    pub fn select<S: Into<String>>(&self, columns: impl IntoIterator<Item = S>) -> SelectStmt<'_> {
        SelectStmt::new(self, columns.into_iter().map(Into::into).collect())
    }

    pub fn insert<R: Record>(&self, records: impl IntoIterator<Item = R>) -> InsertStmt<'_, R> {
        InsertStmt::new(self, records.into_iter().collect())
    }

    /// Overwrite columns of matching rows. Chain [`UpdateStmt::set`] for
    /// more columns.
    pub fn update<S, V>(&self, values: impl IntoIterator<Item = (S, V)>) -> UpdateStmt<'_>
    where
        S: Into<String>,
        V: Into<CellValue>,
    {
        UpdateStmt::new(
            self,
            values
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        )
    }

    pub fn delete(&self) -> DeleteStmt<'_> {
        DeleteStmt::new(self)
    }

    pub fn count(&self) -> CountStmt<'_> {
        CountStmt::new(self)
    }

    /// Release this handle's evaluation cell.
    pub async fn close(self, ctx: &OpContext) -> SheetDbResult<()> {
        self.scratchpad.close(ctx).await?;
        info!(sheet = %self.sheet, "row store closed");
        Ok(())
    }

    /// Sheet row numbers of the live rows matching `filter`.
    pub(super) async fn matching_rows(
        &self,
        ctx: &OpContext,
        filter: Option<(String, Vec<Value>)>,
    ) -> SheetDbResult<Vec<u32>> {
        let mut builder = QueryBuilder::new(
            self.mapping.array_map(),
            row_exists_interceptor,
            [array_column(MAX_COLUMN)],
        );
        if let Some((template, args)) = filter {
            builder = builder.where_(template, args);
        }
        let query = builder.generate()?;

        let formula = row_indices_formula(&a1_range(&self.sheet, ROW_TABLE_RANGE), &query);
        let value = self.scratchpad.eval(ctx, formula).await?;
        if let Some(code) = value.error_code().filter(|c| *c != NA_VALUE) {
            return Err(SheetDbError::backend(
                "eval",
                self.scratchpad.eval_cell(),
                BackendError::FormulaError {
                    reason: format!("{} while matching rows of {}", code, self.sheet),
                },
            ));
        }
        let rows = parse_row_indices(&value)?;
        debug!(sheet = %self.sheet, query = %query, rows = rows.len(), "matched rows");
        Ok(rows)
    }
}

/// `=JOIN(",", ARRAYFORMULA(QUERY({data, ROW(data)}, "query")))`: the sheet
/// row numbers of matching rows, comma separated.
fn row_indices_formula(data: &str, query: &str) -> String {
    format!(
        r#"=JOIN(",", ARRAYFORMULA(QUERY({{{}, ROW({})}}, "{}")))"#,
        data,
        data,
        query.replace('"', "\"\"")
    )
}

fn parse_row_indices(value: &CellValue) -> Result<Vec<u32>, ProtocolError> {
    let malformed = || ProtocolError::MalformedRowIndices {
        raw: value.describe(),
    };
    match value {
        CellValue::Null => Ok(Vec::new()),
        CellValue::Text(text) if text.trim().is_empty() || text == NA_VALUE => Ok(Vec::new()),
        CellValue::Number(n) if *n >= 1.0 && n.fract() == 0.0 => Ok(vec![*n as u32]),
        CellValue::Text(text) => text
            .split(',')
            .map(|part| part.trim().parse::<u32>().map_err(|_| malformed()))
            .collect(),
        _ => Err(malformed()),
    }
}

//! Single-use statements. Each borrows its [`RowStore`] and is consumed by
//! `exec`.

use super::store::RowStore;
use crate::OpContext;
use serde_json::Value;
use sheetdb_backend::BatchUpdateRowsRequest;
use sheetdb_core::{
    a1_range, decode_raw, decode_row, encode_row, row_exists_interceptor, row_range, CellValue,
    ColumnOrderBy, QueryBuilder, RawRow, Record, SchemaError, SheetDbError, SheetDbResult, ROW_INDEX_COLUMN,
    ROW_TABLE_RANGE,
};
use tracing::debug;

// ============================================================================
// SELECT
// ============================================================================

pub struct SelectStmt<'a> {
    store: &'a RowStore,
    columns: Vec<String>,
    builder: QueryBuilder,
}

impl<'a> SelectStmt<'a> {
    pub(super) fn new(store: &'a RowStore, columns: Vec<String>) -> Self {
        let builder = QueryBuilder::new(
            store.mapping.name_map(),
            row_exists_interceptor,
            columns.iter().cloned(),
        );
        Self {
            store,
            columns,
            builder,
        }
    }

    /// Filter with a `?`-placeholder template, e.g. `"age > ? AND name = ?"`.
    pub fn where_(mut self, template: impl Into<String>, args: Vec<Value>) -> Self {
        self.builder = self.builder.where_(template, args);
        self
    }

    pub fn order_by(mut self, ordering: impl IntoIterator<Item = ColumnOrderBy>) -> Self {
        self.builder = self.builder.order_by(ordering);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.builder = self.builder.limit(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.builder = self.builder.offset(offset);
        self
    }

    /// Decode matching rows into records.
    pub async fn exec<R: Record>(self, ctx: &OpContext) -> SheetDbResult<Vec<R>> {
        let (columns, rows) = self.fetch(ctx).await?;
        rows.iter()
            .map(|row| decode_row::<R, _>(row, &columns).map_err(SheetDbError::from))
            .collect()
    }

    /// Matching rows keyed by column name, undecoded.
    pub async fn exec_raw(self, ctx: &OpContext) -> SheetDbResult<Vec<RawRow>> {
        let (columns, rows) = self.fetch(ctx).await?;
        Ok(rows.iter().map(|row| decode_raw(row, &columns)).collect())
    }

    async fn fetch(self, ctx: &OpContext) -> SheetDbResult<(Vec<String>, Vec<Vec<CellValue>>)> {
        let Self {
            store,
            columns,
            builder,
        } = self;
        let query = builder.generate()?;
        debug!(sheet = %store.sheet, query = %query, "select");

        let result = ctx
            .call(
                "query_rows",
                &store.sheet,
                store
                    .backend
                    .query_rows(&store.spreadsheet_id, &store.sheet, &query, true),
            )
            .await?;
        let columns = if columns.is_empty() {
            store.columns()
        } else {
            columns
        };
        Ok((columns, result.rows))
    }
}

// ============================================================================
// INSERT
// ============================================================================

pub struct InsertStmt<'a, R> {
    store: &'a RowStore,
    records: Vec<R>,
}

impl<'a, R: Record> InsertStmt<'a, R> {
    pub(super) fn new(store: &'a RowStore, records: Vec<R>) -> Self {
        Self { store, records }
    }

    /// Append the records below the last row. Returns how many were written.
    pub async fn exec(self, ctx: &OpContext) -> SheetDbResult<usize> {
        if self.records.is_empty() {
            return Ok(0);
        }
        let store = self.store;
        let names = store.mapping.names();
        let rows: Vec<Vec<CellValue>> = self
            .records
            .iter()
            .map(|record| encode_row(record, names))
            .collect();
        let count = rows.len();

        let range = a1_range(&store.sheet, ROW_TABLE_RANGE);
        ctx.call(
            "insert_rows",
            &range,
            store
                .backend
                .insert_rows(&store.spreadsheet_id, &range, rows),
        )
        .await?;
        debug!(sheet = %store.sheet, rows = count, "inserted");
        Ok(count)
    }
}

// ============================================================================
// UPDATE
// ============================================================================

pub struct UpdateStmt<'a> {
    store: &'a RowStore,
    values: Vec<(String, CellValue)>,
    filter: Option<(String, Vec<Value>)>,
}

impl<'a> UpdateStmt<'a> {
    pub(super) fn new(store: &'a RowStore, values: Vec<(String, CellValue)>) -> Self {
        Self {
            store,
            values,
            filter: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn where_(mut self, template: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter = Some((template.into(), args));
        self
    }

    /// Write the new values into every matching live row, touching only the
    /// changed columns. Returns the number of rows updated.
    pub async fn exec(self, ctx: &OpContext) -> SheetDbResult<usize> {
        let store = self.store;
        if self.values.is_empty() {
            return Err(SchemaError::EmptyColumns.into());
        }

        let mut targets = Vec::with_capacity(self.values.len());
        for (column, value) in self.values {
            if column == ROW_INDEX_COLUMN {
                return Err(SchemaError::ReservedColumn { column }.into());
            }
            let letter = store.mapping.resolve(&column)?.letter.clone();
            targets.push((letter, value));
        }

        let rows = store.matching_rows(ctx, self.filter).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let requests: Vec<BatchUpdateRowsRequest> = rows
            .iter()
            .flat_map(|row| {
                targets.iter().map(move |(letter, value)| BatchUpdateRowsRequest {
                    range: a1_range(&store.sheet, &format!("{}{}", letter, row)),
                    values: vec![vec![value.clone()]],
                })
            })
            .collect();
        ctx.call(
            "batch_update_rows",
            &store.sheet,
            store
                .backend
                .batch_update_rows(&store.spreadsheet_id, requests),
        )
        .await?;
        debug!(sheet = %store.sheet, rows = rows.len(), columns = targets.len(), "updated");
        Ok(rows.len())
    }
}

// ============================================================================
// DELETE
// ============================================================================

pub struct DeleteStmt<'a> {
    store: &'a RowStore,
    filter: Option<(String, Vec<Value>)>,
}

impl<'a> DeleteStmt<'a> {
    pub(super) fn new(store: &'a RowStore) -> Self {
        Self {
            store,
            filter: None,
        }
    }

    pub fn where_(mut self, template: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter = Some((template.into(), args));
        self
    }

    /// Clear every matching live row in place. Returns the number of rows
    /// cleared.
    pub async fn exec(self, ctx: &OpContext) -> SheetDbResult<usize> {
        let store = self.store;
        let rows = store.matching_rows(ctx, self.filter).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let ranges: Vec<String> = rows
            .iter()
            .map(|&row| a1_range(&store.sheet, &row_range(row)))
            .collect();
        ctx.call(
            "clear",
            &store.sheet,
            store.backend.clear(&store.spreadsheet_id, &ranges),
        )
        .await?;
        debug!(sheet = %store.sheet, rows = rows.len(), "deleted");
        Ok(rows.len())
    }
}

// ============================================================================
// COUNT
// ============================================================================

pub struct CountStmt<'a> {
    store: &'a RowStore,
    builder: QueryBuilder,
}

impl<'a> CountStmt<'a> {
    pub(super) fn new(store: &'a RowStore) -> Self {
        let builder = QueryBuilder::new(
            store.mapping.name_map(),
            row_exists_interceptor,
            std::iter::empty::<String>(),
        )
        .count();
        Self { store, builder }
    }

    pub fn where_(mut self, template: impl Into<String>, args: Vec<Value>) -> Self {
        self.builder = self.builder.where_(template, args);
        self
    }

    pub async fn exec(self, ctx: &OpContext) -> SheetDbResult<u64> {
        let store = self.store;
        let query = self.builder.generate()?;
        debug!(sheet = %store.sheet, query = %query, "count");

        let result = ctx
            .call(
                "query_rows",
                &store.sheet,
                store
                    .backend
                    .query_rows(&store.spreadsheet_id, &store.sheet, &query, true),
            )
            .await?;
        let count = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(CellValue::as_f64)
            .unwrap_or(0.0);
        Ok(count as u64)
    }
}

use super::codec::{codec_for, ValueCodec};
use crate::scratchpad::{Intent, Scratchpad};
use crate::{ensure_sheet, OpContext};
use sheetdb_backend::SheetsBackend;
use sheetdb_core::{
    a1_range, BackendError, CellValue, KvMode, KvStoreConfig, ProtocolError, SheetDbError,
    SheetDbResult, KV_HEADER, KV_HEADER_RANGE, KV_KEY_RANGE, KV_TABLE_RANGE, KV_TS_RANGE,
    NA_VALUE,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an interrupted sequence was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The write landed; the booking was only left uncleared.
    Completed,
    /// The write never landed; the previous state stands.
    NotApplied,
}

// ============================================================================
// FORMULAS
// ============================================================================

/// Escape `text` for use inside a formula string literal.
fn quote(text: &str) -> String {
    text.replace('"', "\"\"")
}

fn lookup_formula(mode: KvMode, key: &str, table: &str) -> String {
    match mode {
        KvMode::Default => format!(r#"=VLOOKUP("{}", {}, 2, FALSE)"#, quote(key), table),
        KvMode::AppendOnly => format!(
            r#"=VLOOKUP("{}", SORT({}, 3, FALSE), 2, FALSE)"#,
            quote(key),
            table
        ),
    }
}

fn match_formula(key: &str, keys: &str) -> String {
    format!(r#"=MATCH("{}", {}, 0)"#, quote(key), keys)
}

fn latest_order_formula(key: &str, table: &str) -> String {
    format!(
        r#"=IFERROR(VLOOKUP("{}", SORT({}, 3, FALSE), 3, FALSE), 0)"#,
        quote(key),
        table
    )
}

fn count_formula(key: &str, keys: &str, ts: &str, order: i64) -> String {
    format!(r#"=COUNTIFS({}, "{}", {}, {})"#, keys, quote(key), ts, order)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn validate_key(key: &str) -> SheetDbResult<()> {
    if key.is_empty() {
        return Err(SheetDbError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty",
        });
    }
    if key.eq_ignore_ascii_case(KV_HEADER[0]) {
        return Err(SheetDbError::InvalidKey {
            key: key.to_string(),
            reason: "key collides with the header row",
        });
    }
    Ok(())
}

// ============================================================================
// STORE
// ============================================================================

/// String keys to byte values, persisted in one sheet.
///
/// In [`KvMode::Default`] each key owns one row that is overwritten in
/// place. In [`KvMode::AppendOnly`] every write appends a row stamped with
/// a strictly increasing order and reads pick the highest order.
pub struct KvStore {
    backend: Arc<dyn SheetsBackend>,
    spreadsheet_id: String,
    sheet: String,
    config: KvStoreConfig,
    codec: Box<dyn ValueCodec>,
    scratchpad: Scratchpad,
}

impl fmt::Debug for KvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStore")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet", &self.sheet)
            .field("config", &self.config)
            .field("codec", &self.codec)
            .field("scratchpad", &self.scratchpad)
            .finish_non_exhaustive()
    }
}

impl KvStore {
    /// Open (creating if needed) the store in `sheet` and resolve any
    /// interrupted sequence left in its scratchpad.
    pub async fn open(
        ctx: &OpContext,
        backend: Arc<dyn SheetsBackend>,
        spreadsheet_id: &str,
        sheet: &str,
        config: KvStoreConfig,
    ) -> SheetDbResult<Self> {
        let created = ensure_sheet(ctx, backend.as_ref(), spreadsheet_id, sheet).await?;

        let header_range = a1_range(sheet, KV_HEADER_RANGE);
        let header = ctx
            .call(
                "get_rows",
                &header_range,
                backend.get_rows(spreadsheet_id, &header_range),
            )
            .await?;
        if header.is_empty() {
            let cells = KV_HEADER.iter().map(|h| CellValue::from(*h)).collect();
            ctx.call(
                "overwrite_rows",
                &header_range,
                backend.overwrite_rows(spreadsheet_id, &header_range, vec![cells]),
            )
            .await?;
        }

        let scratchpad = Scratchpad::open(ctx, backend.clone(), spreadsheet_id, sheet).await?;
        let store = Self {
            backend,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet: sheet.to_string(),
            codec: codec_for(config.codec),
            config,
            scratchpad,
        };

        if let Err(err) = store.recover(ctx).await {
            if let Err(close_err) = store.scratchpad.close(ctx).await {
                warn!(sheet, error = %close_err, "failed to release evaluation cell");
            }
            return Err(err);
        }

        info!(
            sheet,
            created,
            mode = ?store.config.mode,
            cell = store.scratchpad.eval_cell(),
            "kv store opened"
        );
        Ok(store)
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn config(&self) -> &KvStoreConfig {
        &self.config
    }

    pub async fn get(&self, ctx: &OpContext, key: &str) -> SheetDbResult<Vec<u8>> {
        validate_key(key)?;
        match self.read_raw(ctx, key).await? {
            Some(stored) => Ok(self.codec.decode(&stored)?),
            None => Err(SheetDbError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    pub async fn set(&self, ctx: &OpContext, key: &str, value: &[u8]) -> SheetDbResult<()> {
        validate_key(key)?;
        let encoded = self.codec.encode(value)?;
        match self.config.mode {
            KvMode::Default => self.put(ctx, key, encoded).await,
            KvMode::AppendOnly => self.append(ctx, key, encoded).await,
        }
    }

    /// Remove `key`. Deleting a missing key is a no-op.
    pub async fn delete(&self, ctx: &OpContext, key: &str) -> SheetDbResult<()> {
        validate_key(key)?;
        match self.config.mode {
            KvMode::Default => self.remove(ctx, key).await,
            KvMode::AppendOnly => self.append(ctx, key, String::new()).await,
        }
    }

    /// Release this handle's evaluation cell.
    pub async fn close(self, ctx: &OpContext) -> SheetDbResult<()> {
        self.scratchpad.close(ctx).await?;
        info!(sheet = %self.sheet, "kv store closed");
        Ok(())
    }

    /// Resolve a booking left in the journal. `Ok(None)` means there was
    /// nothing to recover. The journal is cleared only once the outcome is
    /// known.
    pub async fn recover(&self, ctx: &OpContext) -> SheetDbResult<Option<RecoveryOutcome>> {
        let Some(journal) = self.scratchpad.read_journal(ctx).await? else {
            return Ok(None);
        };
        warn!(sheet = %self.sheet, token = %journal.token, "found interrupted booking");

        let Some(intent) = journal.intent else {
            let reason = if journal.raw_intent.is_empty() {
                "intent is missing".to_string()
            } else {
                format!("intent does not parse: {}", journal.raw_intent)
            };
            return Err(ProtocolError::UnrecoverableBooking {
                sheet: self.sheet.clone(),
                token: journal.token,
                reason,
            }
            .into());
        };

        let outcome = self.resolve(ctx, &journal.token, &intent).await?;
        self.scratchpad.release(ctx).await?;
        info!(
            sheet = %self.sheet,
            token = %journal.token,
            op = intent.op(),
            key = intent.key(),
            ?outcome,
            "recovered interrupted booking"
        );
        Ok(Some(outcome))
    }

    // ------------------------------------------------------------------------
    // Write sequences
    // ------------------------------------------------------------------------

    async fn put(&self, ctx: &OpContext, key: &str, encoded: String) -> SheetDbResult<()> {
        let previous = self.read_raw(ctx, key).await?;
        let intent = Intent::Set {
            key: key.to_string(),
            previous,
            next: encoded.clone(),
        };
        let token = self.scratchpad.book(ctx, &intent).await?;

        let result = self.write_row(ctx, key, encoded, now_ms()).await;
        self.finish(ctx, &token, &intent, result).await
    }

    async fn remove(&self, ctx: &OpContext, key: &str) -> SheetDbResult<()> {
        let Some(previous) = self.read_raw(ctx, key).await? else {
            debug!(sheet = %self.sheet, key, "delete of missing key");
            return Ok(());
        };
        let intent = Intent::Delete {
            key: key.to_string(),
            previous: Some(previous),
        };
        let token = self.scratchpad.book(ctx, &intent).await?;

        let result = self.clear_row(ctx, key).await;
        self.finish(ctx, &token, &intent, result).await
    }

    async fn append(&self, ctx: &OpContext, key: &str, encoded: String) -> SheetDbResult<()> {
        let latest = self.latest_order(ctx, key).await?;
        let order = now_ms().max(latest + 1);
        let intent = Intent::Append {
            key: key.to_string(),
            value: encoded.clone(),
            order,
        };
        let token = self.scratchpad.book(ctx, &intent).await?;

        let table = a1_range(&self.sheet, KV_TABLE_RANGE);
        let result = ctx
            .call(
                "insert_rows",
                &table,
                self.backend
                    .insert_rows(&self.spreadsheet_id, &table, vec![row_cells(key, encoded, order)]),
            )
            .await
            .map(|_| ());
        self.finish(ctx, &token, &intent, result).await
    }

    /// Release the booking after a successful step; otherwise try to settle
    /// it inline and hand back the original error.
    async fn finish(
        &self,
        ctx: &OpContext,
        token: &str,
        intent: &Intent,
        result: SheetDbResult<()>,
    ) -> SheetDbResult<()> {
        let err = match result {
            Ok(()) => return self.scratchpad.release(ctx).await,
            Err(err) => err,
        };
        warn!(
            sheet = %self.sheet,
            key = intent.key(),
            op = intent.op(),
            error = %err,
            "write failed, attempting inline recovery"
        );

        match self.resolve(ctx, token, intent).await {
            Ok(outcome) => match self.scratchpad.release(ctx).await {
                Ok(()) => info!(sheet = %self.sheet, token, ?outcome, "inline recovery settled booking"),
                Err(e) => warn!(sheet = %self.sheet, token, error = %e, "failed to release booking"),
            },
            Err(e) => warn!(
                sheet = %self.sheet,
                token,
                error = %e,
                "inline recovery failed, booking kept for the next open"
            ),
        }
        Err(err)
    }

    async fn resolve(
        &self,
        ctx: &OpContext,
        token: &str,
        intent: &Intent,
    ) -> SheetDbResult<RecoveryOutcome> {
        let unrecoverable = |reason: String| -> SheetDbError {
            ProtocolError::UnrecoverableBooking {
                sheet: self.sheet.clone(),
                token: token.to_string(),
                reason,
            }
            .into()
        };

        match intent {
            Intent::Set {
                key,
                previous,
                next,
            } => {
                let current = self.read_raw(ctx, key).await?;
                if current.as_deref() == Some(next.as_str()) {
                    Ok(RecoveryOutcome::Completed)
                } else if current == *previous {
                    Ok(RecoveryOutcome::NotApplied)
                } else {
                    Err(unrecoverable(format!(
                        "value of {} is neither the previous nor the next value",
                        key
                    )))
                }
            }
            Intent::Delete { key, previous } => {
                let current = self.read_raw(ctx, key).await?;
                if current.is_none() {
                    Ok(RecoveryOutcome::Completed)
                } else if current == *previous {
                    Ok(RecoveryOutcome::NotApplied)
                } else {
                    Err(unrecoverable(format!(
                        "{} holds a value other than the one being deleted",
                        key
                    )))
                }
            }
            Intent::Append { key, order, .. } => {
                let keys = a1_range(&self.sheet, KV_KEY_RANGE);
                let ts = a1_range(&self.sheet, KV_TS_RANGE);
                let count = self
                    .eval_number(ctx, key, count_formula(key, &keys, &ts, *order))
                    .await?;
                if count >= 1.0 {
                    Ok(RecoveryOutcome::Completed)
                } else {
                    Ok(RecoveryOutcome::NotApplied)
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    /// Encoded value of `key`, `None` when absent or tombstoned.
    async fn read_raw(&self, ctx: &OpContext, key: &str) -> SheetDbResult<Option<String>> {
        let table = a1_range(&self.sheet, KV_TABLE_RANGE);
        let value = self
            .scratchpad
            .eval(ctx, lookup_formula(self.config.mode, key, &table))
            .await?;
        match value.error_code() {
            Some(NA_VALUE) => Ok(None),
            Some(code) => Err(self.formula_error(key, code)),
            None if value.is_blank() => Ok(None),
            None => Ok(Some(value.to_string())),
        }
    }

    async fn find_row(&self, ctx: &OpContext, key: &str) -> SheetDbResult<Option<u32>> {
        let keys = a1_range(&self.sheet, KV_KEY_RANGE);
        let value = self.scratchpad.eval(ctx, match_formula(key, &keys)).await?;
        match (value.error_code(), value.as_f64()) {
            (Some(NA_VALUE), _) => Ok(None),
            (Some(code), _) => Err(self.formula_error(key, code)),
            (None, Some(row)) if row >= 1.0 => Ok(Some(row as u32)),
            _ => Err(self.formula_error(key, &value.describe())),
        }
    }

    async fn latest_order(&self, ctx: &OpContext, key: &str) -> SheetDbResult<i64> {
        let table = a1_range(&self.sheet, KV_TABLE_RANGE);
        let latest = self
            .eval_number(ctx, key, latest_order_formula(key, &table))
            .await?;
        Ok(latest as i64)
    }

    /// Evaluate a numeric formula; a non-numeric result counts as zero.
    async fn eval_number(&self, ctx: &OpContext, key: &str, formula: String) -> SheetDbResult<f64> {
        let value = self.scratchpad.eval(ctx, formula).await?;
        if let Some(code) = value.error_code() {
            return Err(self.formula_error(key, code));
        }
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn write_row(
        &self,
        ctx: &OpContext,
        key: &str,
        encoded: String,
        order: i64,
    ) -> SheetDbResult<()> {
        let cells = vec![row_cells(key, encoded, order)];
        match self.find_row(ctx, key).await? {
            Some(row) => {
                let range = a1_range(&self.sheet, &format!("A{}:C{}", row, row));
                ctx.call(
                    "update_rows",
                    &range,
                    self.backend.update_rows(&self.spreadsheet_id, &range, cells),
                )
                .await?;
            }
            None => {
                let table = a1_range(&self.sheet, KV_TABLE_RANGE);
                ctx.call(
                    "insert_rows",
                    &table,
                    self.backend.insert_rows(&self.spreadsheet_id, &table, cells),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn clear_row(&self, ctx: &OpContext, key: &str) -> SheetDbResult<()> {
        let Some(row) = self.find_row(ctx, key).await? else {
            return Ok(());
        };
        let range = a1_range(&self.sheet, &format!("A{}:C{}", row, row));
        ctx.call(
            "clear",
            &range,
            self.backend
                .clear(&self.spreadsheet_id, std::slice::from_ref(&range)),
        )
        .await?;
        Ok(())
    }

    fn formula_error(&self, key: &str, code: &str) -> SheetDbError {
        SheetDbError::backend(
            "eval",
            self.scratchpad.eval_cell(),
            BackendError::FormulaError {
                reason: format!("{} while looking up {:?} in {}", code, key, self.sheet),
            },
        )
    }
}

/// `'key | value | order`. The apostrophe keeps the key literal text.
fn row_cells(key: &str, encoded: String, order: i64) -> Vec<CellValue> {
    vec![
        CellValue::from(format!("'{}", key)),
        CellValue::from(encoded),
        CellValue::from(order),
    ]
}

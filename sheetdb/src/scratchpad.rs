//! Scratchpad sheet: formula evaluation cell and booking journal.
//!
//! Each store owns a companion sheet `<sheet>_scratch`. Every open handle
//! claims its own evaluation cell in column `A` by appending `BOOKED`;
//! formulas are written there and their computed value read back. The
//! journal row `C1:D1` holds the booking token and the JSON intent of the
//! sequence in flight. A token left behind means a sequence was interrupted.

use crate::{ensure_sheet, OpContext};
use serde::{Deserialize, Serialize};
use sheetdb_backend::SheetsBackend;
use sheetdb_core::{
    a1_range, A1Range, CellValue, ProtocolError, SheetDbError, SheetDbResult, SCRATCHPAD_BOOKED,
    SCRATCHPAD_SUFFIX,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const EVAL_COLUMN_RANGE: &str = "A1:A5000000";
const JOURNAL_RANGE: &str = "C1:D1";

// ============================================================================
// JOURNAL
// ============================================================================

/// The multi-step write a booking protects. Values are stored encoded, as
/// they appear in the value column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Intent {
    Set {
        key: String,
        previous: Option<String>,
        next: String,
    },
    Delete {
        key: String,
        previous: Option<String>,
    },
    Append {
        key: String,
        value: String,
        order: i64,
    },
}

impl Intent {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key, .. } | Self::Append { key, .. } => key,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Delete { .. } => "delete",
            Self::Append { .. } => "append",
        }
    }
}

/// Contents of a non-empty journal row.
#[derive(Debug, Clone, PartialEq)]
pub struct Journal {
    pub token: String,
    /// `None` when the intent cell is empty or does not parse.
    pub intent: Option<Intent>,
    pub raw_intent: String,
}

// ============================================================================
// SCRATCHPAD
// ============================================================================

#[derive(Clone)]
pub struct Scratchpad {
    backend: Arc<dyn SheetsBackend>,
    spreadsheet_id: String,
    owner: String,
    sheet: String,
    eval_cell: String,
}

impl std::fmt::Debug for Scratchpad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scratchpad")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet", &self.sheet)
            .field("eval_cell", &self.eval_cell)
            .finish_non_exhaustive()
    }
}

impl Scratchpad {
    /// Ensure the scratch sheet for `owner` exists and claim an evaluation
    /// cell for this handle.
    pub async fn open(
        ctx: &OpContext,
        backend: Arc<dyn SheetsBackend>,
        spreadsheet_id: &str,
        owner: &str,
    ) -> SheetDbResult<Self> {
        let sheet = format!("{}{}", owner, SCRATCHPAD_SUFFIX);
        ensure_sheet(ctx, backend.as_ref(), spreadsheet_id, &sheet).await?;

        let column = a1_range(&sheet, EVAL_COLUMN_RANGE);
        let booked = ctx
            .call(
                "insert_rows",
                &column,
                backend.insert_rows(
                    spreadsheet_id,
                    &column,
                    vec![vec![CellValue::from(SCRATCHPAD_BOOKED)]],
                ),
            )
            .await?;
        let eval_cell = A1Range::parse(&booked.updated_range)
            .map_err(|e| SheetDbError::backend("insert_rows", &column, e))?
            .first_cell()
            .to_string();
        debug!(sheet = %sheet, cell = %eval_cell, "claimed evaluation cell");

        Ok(Self {
            backend,
            spreadsheet_id: spreadsheet_id.to_string(),
            owner: owner.to_string(),
            sheet,
            eval_cell,
        })
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn eval_cell(&self) -> &str {
        &self.eval_cell
    }

    /// Write `formula` into the evaluation cell and return its computed value.
    pub async fn eval(&self, ctx: &OpContext, formula: String) -> SheetDbResult<CellValue> {
        debug!(sheet = %self.owner, cell = %self.eval_cell, formula = %formula, "evaluating formula");
        let result = ctx
            .call(
                "update_rows",
                &self.eval_cell,
                self.backend.update_rows(
                    &self.spreadsheet_id,
                    &self.eval_cell,
                    vec![vec![CellValue::Text(formula)]],
                ),
            )
            .await?;
        Ok(result
            .updated_values
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or_default())
    }

    /// Current journal, or `None` if no token is present.
    pub async fn read_journal(&self, ctx: &OpContext) -> SheetDbResult<Option<Journal>> {
        let range = self.journal_range();
        let rows = ctx
            .call(
                "get_rows",
                &range,
                self.backend.get_rows(&self.spreadsheet_id, &range),
            )
            .await?;

        let mut cells = rows.into_iter().next().unwrap_or_default().into_iter();
        let token = cells.next().unwrap_or_default();
        if token.is_blank() {
            return Ok(None);
        }
        let raw_intent = cells.next().map(|c| c.to_string()).unwrap_or_default();
        let intent = serde_json::from_str(&raw_intent).ok();
        Ok(Some(Journal {
            token: token.to_string(),
            intent,
            raw_intent,
        }))
    }

    /// Record `intent` under a fresh token. Refused while another booking is
    /// present; the token is read back to detect a concurrent writer.
    pub async fn book(&self, ctx: &OpContext, intent: &Intent) -> SheetDbResult<String> {
        if let Some(journal) = self.read_journal(ctx).await? {
            return Err(ProtocolError::ScratchpadBusy {
                sheet: self.owner.clone(),
                token: journal.token,
            }
            .into());
        }

        let token = Uuid::now_v7().to_string();
        let payload = serde_json::to_string(intent).map_err(|e| ProtocolError::IntentEncoding {
            reason: e.to_string(),
        })?;
        let range = self.journal_range();
        ctx.call(
            "update_rows",
            &range,
            self.backend.update_rows(
                &self.spreadsheet_id,
                &range,
                vec![vec![CellValue::from(token.as_str()), CellValue::from(payload)]],
            ),
        )
        .await?;

        let found = self
            .read_journal(ctx)
            .await?
            .map(|j| j.token)
            .unwrap_or_default();
        if found != token {
            warn!(sheet = %self.owner, expected = %token, found = %found, "booking overwritten");
            return Err(ProtocolError::BookingLost {
                sheet: self.owner.clone(),
                expected: token,
                found,
            }
            .into());
        }
        debug!(sheet = %self.owner, token = %token, op = intent.op(), key = intent.key(), "booked");
        Ok(token)
    }

    /// Clear the journal row.
    pub async fn release(&self, ctx: &OpContext) -> SheetDbResult<()> {
        let range = self.journal_range();
        ctx.call(
            "clear",
            &range,
            self.backend
                .clear(&self.spreadsheet_id, std::slice::from_ref(&range)),
        )
        .await?;
        Ok(())
    }

    /// Give the evaluation cell back.
    pub async fn close(&self, ctx: &OpContext) -> SheetDbResult<()> {
        ctx.call(
            "clear",
            &self.eval_cell,
            self.backend
                .clear(&self.spreadsheet_id, std::slice::from_ref(&self.eval_cell)),
        )
        .await?;
        Ok(())
    }

    fn journal_range(&self) -> String {
        a1_range(&self.sheet, JOURNAL_RANGE)
    }
}

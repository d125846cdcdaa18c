//! SheetDB - Spreadsheet-Backed Stores
//!
//! Two stores persisted as spreadsheet grids:
//!
//! - [`KvStore`]: string keys to byte values, in overwrite or append-only
//!   mode. Multi-step writes are journaled in a scratchpad sheet so an
//!   interrupted sequence is resolved the next time the store opens.
//! - [`RowStore`]: a fixed column layout with select / insert / update /
//!   delete / count statements compiled to the backend query language.
//!
//! Every operation takes an [`OpContext`] carrying cancellation and an
//! optional deadline.

pub mod context;
pub mod kv;
pub mod row;
pub mod scratchpad;

pub use context::OpContext;
pub use kv::{Base64Codec, BasicCodec, KvStore, RecoveryOutcome, ValueCodec};
pub use row::{CountStmt, DeleteStmt, InsertStmt, RowStore, SelectStmt, UpdateStmt};
pub use scratchpad::{Intent, Journal, Scratchpad};

pub use sheetdb_backend::{MemorySheets, SheetsBackend};
pub use sheetdb_core::{
    CellValue, CodecKind, ColumnOrderBy, KvMode, KvStoreConfig, OrderBy, RawRow, Record,
    RowStoreConfig, SheetDbError, SheetDbResult,
};

use sheetdb_core::BackendError;

/// Create sheet `name`, tolerating one that already exists. Returns whether
/// the sheet was created.
pub(crate) async fn ensure_sheet(
    ctx: &OpContext,
    backend: &dyn SheetsBackend,
    spreadsheet_id: &str,
    name: &str,
) -> SheetDbResult<bool> {
    match ctx
        .call("create_sheet", name, backend.create_sheet(spreadsheet_id, name))
        .await
    {
        Ok(()) => Ok(true),
        Err(SheetDbError::Backend {
            source: BackendError::SheetExists { .. },
            ..
        }) => Ok(false),
        Err(e) => Err(e),
    }
}

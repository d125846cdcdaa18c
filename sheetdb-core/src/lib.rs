//! SheetDB Core - Shared Types
//!
//! Pure data structures and pure functions: cell values, A1 ranges, column
//! mapping, the query builder and the row codec. Nothing here talks to a
//! backend; the store crates build on top of it.

pub mod a1;
pub mod column;
pub mod config;
pub mod error;
pub mod predicate;
pub mod query;
pub mod record;
pub mod value;

pub use a1::{a1_range, A1Range};
pub use column::{
    array_column, column_letter, is_column_identifier, ColumnIdx, ColumnMapping, ColumnRefs, MAX_COLUMN,
    ROW_INDEX_COLUMN, ROW_INDEX_FORMULA,
};
pub use config::{CodecKind, KvMode, KvStoreConfig, RowStoreConfig};
pub use error::{
    BackendError, BackendResult, CodecError, ConfigError, ProtocolError, QueryError, SchemaError,
    SheetDbError, SheetDbResult,
};
pub use predicate::PredicateTemplate;
pub use query::{row_exists_interceptor, ColumnOrderBy, OrderBy, QueryBuilder, WhereInterceptor};
pub use record::{decode_raw, decode_row, encode_row, Field, FieldType, RawRow, Record};
pub use value::{CellValue, ERROR_CODES, ERROR_VALUE, NA_VALUE};

// ============================================================================
// SHEET LAYOUT CONSTANTS
// ============================================================================

/// Suffix of the companion sheet holding the scratchpad.
pub const SCRATCHPAD_SUFFIX: &str = "_scratch";

/// Marker appended to claim an evaluation cell.
pub const SCRATCHPAD_BOOKED: &str = "BOOKED";

/// Row store header row.
pub const ROW_HEADER_RANGE: &str = "A1:Z1";

/// Row store data range, open-ended below the header.
pub const ROW_TABLE_RANGE: &str = "A2:Z";

/// Full row of a row store table.
pub fn row_range(row: u32) -> String {
    format!("A{}:Z{}", row, row)
}

/// Key-value table, header included.
pub const KV_TABLE_RANGE: &str = "A1:C5000000";

/// Key column of the key-value table.
pub const KV_KEY_RANGE: &str = "A1:A5000000";

/// Timestamp column of the key-value table.
pub const KV_TS_RANGE: &str = "C1:C5000000";

/// Key-value header row.
pub const KV_HEADER_RANGE: &str = "A1:C1";

/// Key-value header cells.
pub const KV_HEADER: [&str; 3] = ["key", "value", "_ts"];

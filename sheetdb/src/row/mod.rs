//! SQL-like row store over a fixed column layout.
//!
//! Column `A` is the reserved row-index column `_rid`; every inserted row
//! writes `=ROW()` there and a row is live while it is non-empty. Deletes
//! clear the row instead of shifting the sheet.

mod stmt;
mod store;

pub use stmt::{CountStmt, DeleteStmt, InsertStmt, SelectStmt, UpdateStmt};
pub use store::RowStore;

//! Column mapping between logical column names and physical sheet columns.
//!
//! Row store tables have a fixed width of [`MAX_COLUMN`] columns. Column `A`
//! always holds the reserved row-index column, whose `=ROW()` formula marks a
//! row as live. User columns follow left to right in declaration order.
//!
//! ```text
//!   A      B      C      D    ...  Z
//!   _rid | name | age  | dob | ... |
//! ```
//!
//! The width is a hard limit: range formulas such as the row-indices lookup
//! are pre-sized against `A:Z`, so a 27th column would silently fall outside
//! every range.

use crate::error::SchemaError;
use std::collections::HashMap;

/// Maximum number of physical columns in a row store table.
pub const MAX_COLUMN: usize = 26;

/// Reserved logical column holding the per-row index formula.
pub const ROW_INDEX_COLUMN: &str = "_rid";

/// Formula written into the row-index column of every inserted row.
pub const ROW_INDEX_FORMULA: &str = "=ROW()";

/// Convert a zero-based column index into its letter (`0 -> "A"`).
pub fn column_letter(index: usize) -> Result<String, SchemaError> {
    if index >= MAX_COLUMN {
        return Err(SchemaError::ColumnLimitExceeded {
            index,
            max: MAX_COLUMN,
        });
    }
    Ok(column_letters(index))
}

/// Letters for any zero-based column index (`26 -> "AA"`), without the row
/// store width limit.
pub(crate) fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `name` is a single bare word in a filter template
/// (`[A-Za-z_][A-Za-z0-9_]*`). Only such names can be rewritten inside a
/// `where` predicate.
pub fn is_column_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_char)
}

/// Column reference used by queries over array literals (`{range, ROW(range)}`),
/// where columns are addressed as `Col1`, `Col2`, ...
pub fn array_column(index: usize) -> String {
    format!("Col{}", index + 1)
}

/// Physical position of a logical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIdx {
    pub letter: String,
    pub index: usize,
}

/// Immutable mapping from logical column names to physical columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    order: Vec<String>,
    by_name: HashMap<String, ColumnIdx>,
}

impl ColumnMapping {
    /// Build a mapping from a header row, assigning indices left to right.
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Result<Self, SchemaError> {
        if header.is_empty() {
            return Err(SchemaError::EmptyColumns);
        }

        let mut order = Vec::with_capacity(header.len());
        let mut by_name = HashMap::with_capacity(header.len());
        for (index, name) in header.iter().enumerate() {
            let name = name.as_ref().to_string();
            let letter = column_letter(index)?;
            if by_name
                .insert(name.clone(), ColumnIdx { letter, index })
                .is_some()
            {
                return Err(SchemaError::DuplicateColumn { column: name });
            }
            order.push(name);
        }

        Ok(Self { order, by_name })
    }

    /// Build the row store mapping: the row-index column followed by `columns`.
    pub fn for_row_store<S: AsRef<str>>(columns: &[S]) -> Result<Self, SchemaError> {
        let mut header = Vec::with_capacity(columns.len() + 1);
        header.push(ROW_INDEX_COLUMN.to_string());
        for column in columns {
            let column = column.as_ref();
            if column == ROW_INDEX_COLUMN {
                return Err(SchemaError::ReservedColumn {
                    column: column.to_string(),
                });
            }
            if !is_column_identifier(column) {
                return Err(SchemaError::InvalidColumnName {
                    column: column.to_string(),
                });
            }
            header.push(column.to_string());
        }
        Self::from_header(&header)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnIdx> {
        self.by_name.get(name)
    }

    /// Look up a column, reporting absent names as unknown columns.
    pub fn resolve(&self, name: &str) -> Result<&ColumnIdx, SchemaError> {
        self.by_name
            .get(name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                column: name.to_string(),
            })
    }

    /// All logical names in physical order, including reserved ones.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// References by sheet letter (`name -> "B"`).
    pub fn name_map(&self) -> ColumnRefs {
        self.refs(|idx| idx.letter.clone())
    }

    /// References by array position (`name -> "Col2"`).
    pub fn array_map(&self) -> ColumnRefs {
        self.refs(|idx| array_column(idx.index))
    }

    fn refs(&self, reference: impl Fn(&ColumnIdx) -> String) -> ColumnRefs {
        let entries = self
            .order
            .iter()
            .map(|name| (name.clone(), reference(&self.by_name[name])))
            .collect();
        ColumnRefs::new(entries)
    }
}

/// Ordered name-to-reference table consumed by the query builder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnRefs {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl ColumnRefs {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self { entries, index }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&i| self.entries[i].1.as_str())
    }

    /// Resolve a name, passing unknown names through unchanged.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).unwrap_or(name)
    }

    /// User-visible columns in mapping order (reserved columns excluded).
    pub fn user_columns(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| *name != ROW_INDEX_COLUMN)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Row codec: typed records <-> raw cell rows.
//!
//! Records describe themselves with an explicit field table instead of
//! runtime reflection. Each [`Field`] pairs a logical column name with a
//! typed getter and setter:
//!
//! ```
//! use sheetdb_core::record::{Field, Record};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: Option<i64>,
//! }
//!
//! impl Record for Person {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::text("name", |p: &Person| Some(p.name.clone()), |p: &mut Person, v| p.name = v),
//!             Field::integer("age", |p: &Person| p.age, |p: &mut Person, v| p.age = Some(v)),
//!         ]
//!     }
//! }
//! ```
//!
//! A getter returning `None` omits the value, which is written as an empty
//! cell.

use crate::column::{ROW_INDEX_COLUMN, ROW_INDEX_FORMULA};
use crate::error::SchemaError;
use crate::value::CellValue;

/// Declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Bool,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Bool => "boolean",
        }
    }
}

/// Typed getter/setter pair for one field.
pub enum Accessor<R> {
    Text {
        get: fn(&R) -> Option<String>,
        set: fn(&mut R, String),
    },
    Integer {
        get: fn(&R) -> Option<i64>,
        set: fn(&mut R, i64),
    },
    Float {
        get: fn(&R) -> Option<f64>,
        set: fn(&mut R, f64),
    },
    Bool {
        get: fn(&R) -> Option<bool>,
        set: fn(&mut R, bool),
    },
}

/// A named, typed field of a record.
pub struct Field<R> {
    pub name: &'static str,
    pub accessor: Accessor<R>,
}

impl<R> Field<R> {
    pub fn text(name: &'static str, get: fn(&R) -> Option<String>, set: fn(&mut R, String)) -> Self {
        Self {
            name,
            accessor: Accessor::Text { get, set },
        }
    }

    pub fn integer(name: &'static str, get: fn(&R) -> Option<i64>, set: fn(&mut R, i64)) -> Self {
        Self {
            name,
            accessor: Accessor::Integer { get, set },
        }
    }

    pub fn float(name: &'static str, get: fn(&R) -> Option<f64>, set: fn(&mut R, f64)) -> Self {
        Self {
            name,
            accessor: Accessor::Float { get, set },
        }
    }

    pub fn boolean(name: &'static str, get: fn(&R) -> Option<bool>, set: fn(&mut R, bool)) -> Self {
        Self {
            name,
            accessor: Accessor::Bool { get, set },
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self.accessor {
            Accessor::Text { .. } => FieldType::Text,
            Accessor::Integer { .. } => FieldType::Integer,
            Accessor::Float { .. } => FieldType::Float,
            Accessor::Bool { .. } => FieldType::Bool,
        }
    }

    /// Encode this field of `record` as a cell.
    pub fn read(&self, record: &R) -> CellValue {
        match &self.accessor {
            Accessor::Text { get, .. } => get(record).into(),
            Accessor::Integer { get, .. } => get(record).into(),
            Accessor::Float { get, .. } => get(record).into(),
            Accessor::Bool { get, .. } => get(record).into(),
        }
    }

    /// Coerce `value` into this field of `record`. Blank cells leave the
    /// field untouched.
    pub fn write(&self, record: &mut R, value: &CellValue) -> Result<(), SchemaError> {
        if value.is_blank() {
            return Ok(());
        }

        let mismatch = || SchemaError::TypeMismatch {
            column: self.name.to_string(),
            expected: self.field_type().name(),
            found: value.describe(),
        };

        match &self.accessor {
            Accessor::Text { set, .. } => match value {
                CellValue::Text(s) => set(record, s.clone()),
                CellValue::Number(_) | CellValue::Bool(_) => set(record, value.to_string()),
                CellValue::Null => {}
            },
            Accessor::Integer { set, .. } => {
                let n = match value {
                    CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                        *n as i64
                    }
                    CellValue::Text(s) => s.trim().parse::<i64>().map_err(|_| mismatch())?,
                    _ => return Err(mismatch()),
                };
                set(record, n);
            }
            Accessor::Float { set, .. } => {
                let n = match value {
                    CellValue::Number(n) => *n,
                    CellValue::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch())?,
                    _ => return Err(mismatch()),
                };
                set(record, n);
            }
            Accessor::Bool { set, .. } => {
                let b = match value {
                    CellValue::Bool(b) => *b,
                    CellValue::Text(s) if s.eq_ignore_ascii_case("true") => true,
                    CellValue::Text(s) if s.eq_ignore_ascii_case("false") => false,
                    _ => return Err(mismatch()),
                };
                set(record, b);
            }
        }
        Ok(())
    }
}

/// A type that can be stored as a row.
pub trait Record: Default + Send + Sized {
    fn fields() -> Vec<Field<Self>>;
}

/// Encode `record` against the store's physical column order.
///
/// The row-index column gets the `=ROW()` formula; columns without a
/// matching field are left empty.
pub fn encode_row<R: Record, S: AsRef<str>>(record: &R, columns: &[S]) -> Vec<CellValue> {
    let fields = R::fields();
    columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            if column == ROW_INDEX_COLUMN {
                return CellValue::from(ROW_INDEX_FORMULA);
            }
            fields
                .iter()
                .find(|f| f.name == column)
                .map(|f| f.read(record))
                .unwrap_or_default()
        })
        .collect()
}

/// Decode a raw row positionally against the columns that were selected.
pub fn decode_row<R: Record, S: AsRef<str>>(
    raw: &[CellValue],
    columns: &[S],
) -> Result<R, SchemaError> {
    let fields = R::fields();
    let mut record = R::default();
    for (i, column) in columns.iter().enumerate() {
        let Some(field) = fields.iter().find(|f| f.name == column.as_ref()) else {
            continue;
        };
        if let Some(value) = raw.get(i) {
            field.write(&mut record, value)?;
        }
    }
    Ok(record)
}

/// An undecoded row keyed by column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn into_cells(self) -> Vec<(String, CellValue)> {
        self.cells
    }
}

/// Pair raw cells with the selected column names, padding short rows with
/// `Null`.
pub fn decode_raw<S: AsRef<str>>(raw: &[CellValue], columns: &[S]) -> RawRow {
    let cells = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            (
                column.as_ref().to_string(),
                raw.get(i).cloned().unwrap_or_default(),
            )
        })
        .collect();
    RawRow { cells }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Entry {
        name: String,
        count: i64,
        year: String,
        score: Option<f64>,
        active: bool,
    }

    impl Record for Entry {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::text(
                    "name",
                    |e: &Entry| Some(e.name.clone()).filter(|s| !s.is_empty()),
                    |e: &mut Entry, v| e.name = v,
                ),
                Field::integer(
                    "count",
                    |e: &Entry| Some(e.count).filter(|n| *n != 0),
                    |e: &mut Entry, v| e.count = v,
                ),
                Field::text(
                    "year",
                    |e: &Entry| Some(e.year.clone()),
                    |e: &mut Entry, v| e.year = v,
                ),
                Field::float("score", |e: &Entry| e.score, |e: &mut Entry, v| e.score = Some(v)),
                Field::boolean("active", |e: &Entry| Some(e.active), |e: &mut Entry, v| e.active = v),
            ]
        }
    }

    const COLUMNS: [&str; 4] = ["_rid", "name", "count", "year"];

    #[test]
    fn test_encode_row_layout() {
        let entry = Entry {
            name: "blah".to_string(),
            count: 10,
            year: "2021".to_string(),
            ..Default::default()
        };
        assert_eq!(
            encode_row(&entry, &COLUMNS),
            vec![
                CellValue::from("=ROW()"),
                CellValue::from("blah"),
                CellValue::Number(10.0),
                CellValue::from("2021"),
            ]
        );
    }

    #[test]
    fn test_encode_omitted_fields_as_null() {
        let entry = Entry {
            year: "2021".to_string(),
            ..Default::default()
        };
        let row = encode_row(&entry, &["_rid", "name", "count", "year", "unknown"]);
        assert_eq!(row[1], CellValue::Null);
        assert_eq!(row[2], CellValue::Null);
        assert_eq!(row[4], CellValue::Null);
    }

    #[test]
    fn test_decode_partial_selection() {
        let raw = vec![CellValue::Number(10.0), CellValue::from("blah")];
        let entry: Entry = decode_row(&raw, &["count", "name"]).unwrap();
        assert_eq!(entry.count, 10);
        assert_eq!(entry.name, "blah");
        assert_eq!(entry.year, "");
    }

    #[test]
    fn test_decode_short_row_and_unknown_columns() {
        let raw = vec![CellValue::from("x"), CellValue::from("ignored")];
        let entry: Entry = decode_row(&raw, &["name", "nope", "count"]).unwrap();
        assert_eq!(entry.name, "x");
        assert_eq!(entry.count, 0);
    }

    #[test]
    fn test_decode_coercions() {
        let raw = vec![
            CellValue::Number(2021.0),
            CellValue::from(" 7 "),
            CellValue::from("TRUE"),
            CellValue::from("1.5"),
        ];
        let entry: Entry = decode_row(&raw, &["year", "count", "active", "score"]).unwrap();
        assert_eq!(entry.year, "2021");
        assert_eq!(entry.count, 7);
        assert!(entry.active);
        assert_eq!(entry.score, Some(1.5));
    }

    #[test]
    fn test_decode_type_mismatch() {
        let raw = vec![CellValue::from("abc")];
        let err = decode_row::<Entry, _>(&raw, &["count"]).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::TypeMismatch { ref column, expected: "integer", .. } if column == "count"
        ));

        let raw = vec![CellValue::Number(1.5)];
        assert!(decode_row::<Entry, _>(&raw, &["count"]).is_err());

        let raw = vec![CellValue::Number(1.0)];
        assert!(decode_row::<Entry, _>(&raw, &["active"]).is_err());
    }

    #[test]
    fn test_decode_raw_pads_missing_cells() {
        let raw = decode_raw(&[CellValue::from("a")], &["name", "count"]);
        assert_eq!(raw.get("name"), Some(&CellValue::from("a")));
        assert_eq!(raw.get("count"), Some(&CellValue::Null));
        assert_eq!(raw.columns().collect::<Vec<_>>(), vec!["name", "count"]);
    }

    proptest! {
        #[test]
        fn prop_encode_decode_round_trip(
            name in "[a-z]{1,12}",
            count in 1i64..1_000_000,
            year in "[0-9]{4}",
            score in -1.0e6f64..1.0e6,
            active in any::<bool>(),
        ) {
            let entry = Entry { name, count, year, score: Some(score), active };
            let columns = ["_rid", "name", "count", "year", "score", "active"];
            let row = encode_row(&entry, &columns);
            prop_assert_eq!(&row[0], &CellValue::from(ROW_INDEX_FORMULA));
            let decoded: Entry = decode_row(&row[1..], &columns[1..]).unwrap();
            prop_assert_eq!(decoded, entry);
        }
    }
}

//! Cell values as exchanged with a spreadsheet backend.
//!
//! The backend hands back heterogeneous cells with no type metadata. They are
//! kept as a tagged [`CellValue`] until the row codec coerces them into the
//! declared field types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker returned by lookup formulas when nothing matches.
pub const NA_VALUE: &str = "#N/A";

/// Marker returned when a formula fails to evaluate.
pub const ERROR_VALUE: &str = "#ERROR!";

/// Every error marker a spreadsheet may render in place of a value.
pub const ERROR_CODES: [&str; 8] = [
    NA_VALUE,
    ERROR_VALUE,
    "#VALUE!",
    "#REF!",
    "#NAME?",
    "#DIV/0!",
    "#NUM!",
    "#NULL!",
];

/// A single spreadsheet cell.
///
/// Serialises untagged, which is the JSON shape used by the Sheets API:
/// `null`, `true`, `12.5`, `"text"`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Empty cells and empty strings are both blank to the spreadsheet.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Whether this is a formula (a text value starting with `=`).
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.starts_with('='))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The error marker this cell holds, if any (`#N/A`, `#ERROR!`, ...).
    pub fn error_code(&self) -> Option<&'static str> {
        let text = self.as_text()?;
        ERROR_CODES.iter().copied().find(|code| *code == text)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Bool(_) => "boolean",
            CellValue::Number(_) => "number",
            CellValue::Text(_) => "text",
        }
    }

    /// Describe the value for a type-mismatch report.
    pub fn describe(&self) -> String {
        match self {
            CellValue::Text(s) => format!("text {:?}", s),
            other => format!("{} {}", other.kind(), other),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(true) => write!(f, "TRUE"),
            CellValue::Bool(false) => write!(f, "FALSE"),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(f64::from(value))
    }
}

impl From<u32> for CellValue {
    fn from(value: u32) -> Self {
        CellValue::Number(f64::from(value))
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_shape() {
        let row = vec![
            CellValue::Null,
            CellValue::Bool(true),
            CellValue::Number(10.0),
            CellValue::Text("x".to_string()),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[null,true,10.0,"x"]"#);

        let back: Vec<CellValue> = serde_json::from_str(r#"[null,true,10,"x"]"#).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_display_matches_spreadsheet_rendering() {
        assert_eq!(CellValue::Number(10.0).to_string(), "10");
        assert_eq!(CellValue::Number(3.14).to_string(), "3.14");
        assert_eq!(CellValue::Bool(false).to_string(), "FALSE");
        assert_eq!(CellValue::Null.to_string(), "");
    }

    #[test]
    fn test_blank_and_formula() {
        assert!(CellValue::Null.is_blank());
        assert!(CellValue::from("").is_blank());
        assert!(!CellValue::from(0i64).is_blank());
        assert!(CellValue::from("=ROW()").is_formula());
        assert!(!CellValue::from("ROW()").is_formula());
    }

    #[test]
    fn test_error_code_detection() {
        assert_eq!(CellValue::from("#N/A").error_code(), Some(NA_VALUE));
        assert_eq!(CellValue::from("#REF!").error_code(), Some("#REF!"));
        assert_eq!(CellValue::from("#hashtag").error_code(), None);
        assert_eq!(CellValue::Number(1.0).error_code(), None);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
        assert_eq!(CellValue::from(Some("a")), CellValue::Text("a".to_string()));
    }
}

//! A1 notation helpers.
//!
//! Formatting is used by the stores to address ranges; parsing is used to
//! read back the ranges a backend reports (e.g. the cell an append landed in)
//! and by the in-memory backend to resolve reads and writes.

use crate::column::column_letters;
use crate::error::BackendError;
use std::fmt;

/// Qualify a range with its sheet name (`people!A1:Z1`).
///
/// Sheet names that are not plain identifiers are single-quoted, with inner
/// quotes doubled.
pub fn a1_range(sheet: &str, range: &str) -> String {
    format!("{}!{}", quote_sheet(sheet), range)
}

fn quote_sheet(sheet: &str) -> String {
    let plain = !sheet.is_empty()
        && sheet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Decode column letters (`"A" -> 0`, `"AA" -> 26`).
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (c as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// A parsed A1 range. Rows are 1-based; `end_row: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: Option<String>,
    pub start_col: usize,
    pub start_row: u32,
    pub end_col: usize,
    pub end_row: Option<u32>,
}

impl A1Range {
    /// A single cell.
    pub fn cell(sheet: Option<&str>, col: usize, row: u32) -> Self {
        Self {
            sheet: sheet.map(str::to_string),
            start_col: col,
            start_row: row,
            end_col: col,
            end_row: Some(row),
        }
    }

    /// Parse `Sheet!A1:C5`, `'My sheet'!A2:Z`, `A:A`, `B7`.
    pub fn parse(input: &str) -> Result<Self, BackendError> {
        let invalid = || BackendError::InvalidRange {
            range: input.to_string(),
        };

        let (sheet, cells) = split_sheet(input).ok_or_else(invalid)?;
        let (start, end) = match cells.split_once(':') {
            Some((s, e)) => (s, Some(e)),
            None => (cells, None),
        };

        let (start_col, start_row) = parse_cell(start).ok_or_else(invalid)?;
        let start_col = start_col.ok_or_else(invalid)?;

        let (end_col, end_row) = match end {
            None => (start_col, Some(start_row.ok_or_else(invalid)?)),
            Some(end) => {
                let (col, row) = parse_cell(end).ok_or_else(invalid)?;
                (col.ok_or_else(invalid)?, row)
            }
        };

        let start_row = start_row.unwrap_or(1);
        if end_col < start_col || end_row.is_some_and(|r| r < start_row) {
            return Err(invalid());
        }

        Ok(Self {
            sheet,
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }

    pub fn width(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    pub fn is_single_cell(&self) -> bool {
        self.start_col == self.end_col && self.end_row == Some(self.start_row)
    }

    /// Top-left cell of this range.
    pub fn first_cell(&self) -> Self {
        Self::cell(self.sheet.as_deref(), self.start_col, self.start_row)
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet(sheet))?;
        }
        write!(f, "{}{}", column_letters(self.start_col), self.start_row)?;
        if self.is_single_cell() {
            return Ok(());
        }
        write!(f, ":{}", column_letters(self.end_col))?;
        if let Some(end_row) = self.end_row {
            write!(f, "{}", end_row)?;
        }
        Ok(())
    }
}

fn split_sheet(input: &str) -> Option<(Option<String>, &str)> {
    if let Some(rest) = input.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                    name.push('\'');
                    continue;
                }
                let after = &rest[i + 1..];
                return after.strip_prefix('!').map(|cells| (Some(name), cells));
            }
            name.push(c);
        }
        return None;
    }

    match input.rsplit_once('!') {
        Some((sheet, cells)) if !sheet.is_empty() => Some((Some(sheet.to_string()), cells)),
        Some(_) => None,
        None => Some((None, input)),
    }
}

fn parse_cell(cell: &str) -> Option<(Option<usize>, Option<u32>)> {
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(row)
    };
    if col.is_none() && row.is_none() {
        return None;
    }
    Some((col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a1_range_quotes_unusual_sheet_names() {
        assert_eq!(a1_range("people", "A1:Z1"), "people!A1:Z1");
        assert_eq!(a1_range("my sheet", "A1"), "'my sheet'!A1");
        assert_eq!(a1_range("bob's", "A1"), "'bob''s'!A1");
    }

    #[test]
    fn test_parse_bounded_range() {
        let r = A1Range::parse("kv!A1:C5000000").unwrap();
        assert_eq!(r.sheet.as_deref(), Some("kv"));
        assert_eq!((r.start_col, r.start_row), (0, 1));
        assert_eq!((r.end_col, r.end_row), (2, Some(5000000)));
        assert_eq!(r.width(), 3);
    }

    #[test]
    fn test_parse_open_ended_and_column_ranges() {
        let r = A1Range::parse("people!A2:Z").unwrap();
        assert_eq!((r.start_row, r.end_row, r.end_col), (2, None, 25));

        let r = A1Range::parse("A:A").unwrap();
        assert_eq!((r.start_row, r.end_row), (1, None));
        assert!(r.sheet.is_none());
    }

    #[test]
    fn test_parse_single_cell_and_display_round_trip() {
        let r = A1Range::parse("'my sheet'!B7").unwrap();
        assert!(r.is_single_cell());
        assert_eq!(r.sheet.as_deref(), Some("my sheet"));
        assert_eq!(r.to_string(), "'my sheet'!B7");

        let r = A1Range::parse("people!A2:Z").unwrap();
        assert_eq!(r.to_string(), "people!A2:Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(A1Range::parse("").is_err());
        assert!(A1Range::parse("!A1").is_err());
        assert!(A1Range::parse("a1").is_err());
        assert!(A1Range::parse("B1:A1").is_err());
        assert!(A1Range::parse("A0").is_err());
    }
}

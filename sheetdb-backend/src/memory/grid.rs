//! Raw cell storage for one sheet.

use sheetdb_core::{A1Range, CellValue};
use std::collections::HashSet;

const NULL: &CellValue = &CellValue::Null;

/// Ragged row-major grid of entered values. Rows and columns past the end
/// read as empty.
#[derive(Debug, Clone, Default)]
pub(crate) struct Grid {
    rows: Vec<Vec<CellValue>>,
    /// Cells entered with a leading apostrophe.
    literals: HashSet<(u32, usize)>,
}

impl Grid {
    /// Cell at a 1-based row and 0-based column.
    pub fn get(&self, row: u32, col: usize) -> &CellValue {
        if row == 0 {
            return NULL;
        }
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(col))
            .unwrap_or(NULL)
    }

    pub fn set(&mut self, row: u32, col: usize, value: CellValue) {
        if row == 0 {
            return;
        }
        self.literals.remove(&(row, col));
        let r = row as usize - 1;
        if value.is_blank() {
            if let Some(cells) = self.rows.get_mut(r) {
                if col < cells.len() {
                    cells[col] = CellValue::Null;
                }
            }
            self.trim();
            return;
        }
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Null);
        }
        cells[col] = value;
    }

    /// Store text that is never evaluated, even if it starts with `=`.
    pub fn set_literal(&mut self, row: u32, col: usize, text: String) {
        let blank = text.is_empty();
        self.set(row, col, CellValue::Text(text));
        if !blank && row > 0 {
            self.literals.insert((row, col));
        }
    }

    pub fn is_literal(&self, row: u32, col: usize) -> bool {
        self.literals.contains(&(row, col))
    }

    /// Last row holding any non-blank cell, or 0 for an empty sheet.
    pub fn used_height(&self) -> u32 {
        self.rows
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_blank()))
            .map(|i| i as u32 + 1)
            .unwrap_or(0)
    }

    /// Number of columns up to the rightmost non-blank cell.
    pub fn used_width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Last row of `range` bounded by the used part of the sheet.
    pub fn effective_end(&self, range: &A1Range) -> u32 {
        let used = self.used_height();
        match range.end_row {
            Some(end) => end.min(used.max(range.start_row.saturating_sub(1))),
            None => used.max(range.start_row.saturating_sub(1)),
        }
    }

    /// Last non-blank row within the columns and rows of `range`.
    pub fn last_used_row_in(&self, range: &A1Range) -> Option<u32> {
        let end = self.effective_end(range);
        (range.start_row..=end).rev().find(|&row| {
            (range.start_col..=range.end_col).any(|col| !self.get(row, col).is_blank())
        })
    }

    pub fn clear(&mut self, range: &A1Range) {
        let end = self.effective_end(range);
        for row in range.start_row..=end {
            for col in range.start_col..=range.end_col {
                self.set(row, col, CellValue::Null);
            }
        }
    }

    fn trim(&mut self) {
        for cells in &mut self.rows {
            while cells.last().is_some_and(CellValue::is_blank) {
                cells.pop();
            }
        }
        while self.rows.last().is_some_and(|r| r.is_empty()) {
            self.rows.pop();
        }
    }
}

//! Formula evaluation for the in-memory backend.
//!
//! Supports the functions the stores write into evaluation cells:
//! `VLOOKUP`, `SORT`, `MATCH`, `COUNTIFS`, `IFERROR`, `ROW`, `ARRAYFORMULA`,
//! `JOIN` and `QUERY`, over string/number/boolean literals, A1 references
//! and `{a, b; c, d}` array literals. Failures evaluate to the spreadsheet
//! error marker (`#N/A`, `#VALUE!`, ...) rather than a Rust error.

use super::query;
use super::{Sheet, Spreadsheet};
use sheetdb_core::{A1Range, CellValue, ERROR_VALUE, NA_VALUE};
use std::cmp::Ordering;
use tracing::trace;

/// Nesting limit for formulas that reference other formula cells.
pub(crate) const MAX_DEPTH: usize = 16;

const VALUE_ERROR: &str = "#VALUE!";
const REF_ERROR: &str = "#REF!";
const NAME_ERROR: &str = "#NAME?";

const NULL: &CellValue = &CellValue::Null;

type Code = &'static str;

// ============================================================================
// LEXER / PARSER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Str(String),
    Num(f64),
    Bool(bool),
    Name(String),
    Ref(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
}

fn is_ref_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '!' | ':')
}

fn tokenize(src: &str) -> Option<Vec<Tok>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '{' | '}' | ',' | ';' => {
                chars.next();
                tokens.push(match c {
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    ',' => Tok::Comma,
                    _ => Tok::Semi,
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => {
                            if matches!(chars.peek(), Some((_, '"'))) {
                                chars.next();
                                text.push('"');
                            } else {
                                break;
                            }
                        }
                        Some((_, x)) => text.push(x),
                        None => return None,
                    }
                }
                tokens.push(Tok::Str(text));
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                chars.next();
                let mut end = start + 1;
                while let Some(&(i, x)) = chars.peek() {
                    if x.is_ascii_digit() || x == '.' {
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Num(src[start..end].parse().ok()?));
            }
            '\'' => {
                chars.next();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => {
                            if matches!(chars.peek(), Some((_, '\''))) {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => return None,
                    }
                }
                let mut end = chars.peek().map(|(i, _)| *i).unwrap_or(src.len());
                while let Some(&(i, x)) = chars.peek() {
                    if is_ref_char(x) {
                        end = i + x.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Ref(src[start..end].to_string()));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut end = start;
                while let Some(&(i, x)) = chars.peek() {
                    if is_ref_char(x) {
                        end = i + x.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &src[start..end];
                let is_call = src[end..].trim_start().starts_with('(');
                tokens.push(if is_call {
                    Tok::Name(word.to_ascii_uppercase())
                } else if word.eq_ignore_ascii_case("TRUE") {
                    Tok::Bool(true)
                } else if word.eq_ignore_ascii_case("FALSE") {
                    Tok::Bool(false)
                } else {
                    Tok::Ref(word.to_string())
                });
            }
            _ => return None,
        }
    }

    Some(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(CellValue),
    Ref(String),
    Array(Vec<Vec<Expr>>),
    Call(String, Vec<Expr>),
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Option<Expr> {
        match self.next()? {
            Tok::Str(s) => Some(Expr::Literal(CellValue::Text(s))),
            Tok::Num(n) => Some(Expr::Literal(CellValue::Number(n))),
            Tok::Bool(b) => Some(Expr::Literal(CellValue::Bool(b))),
            Tok::Ref(r) => Some(Expr::Ref(r)),
            Tok::Name(name) => {
                if !self.eat(&Tok::LParen) {
                    return None;
                }
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        if !self.eat(&Tok::Comma) {
                            return None;
                        }
                    }
                }
                Some(Expr::Call(name, args))
            }
            Tok::LBrace => {
                let mut rows = vec![Vec::new()];
                loop {
                    let expr = self.expr()?;
                    if let Some(row) = rows.last_mut() {
                        row.push(expr);
                    }
                    match self.next()? {
                        Tok::Comma => {}
                        Tok::Semi => rows.push(Vec::new()),
                        Tok::RBrace => break,
                        _ => return None,
                    }
                }
                Some(Expr::Array(rows))
            }
            _ => None,
        }
    }
}

fn parse(src: &str) -> Option<Expr> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    let expr = parser.expr()?;
    if parser.peek().is_some() {
        return None;
    }
    Some(expr)
}

// ============================================================================
// VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Cell(CellValue),
    Table(Vec<Vec<CellValue>>),
}

impl Value {
    fn scalar(self) -> Result<CellValue, Code> {
        let cell = match self {
            Value::Cell(c) => c,
            Value::Table(t) => t
                .into_iter()
                .next()
                .and_then(|r| r.into_iter().next())
                .unwrap_or_default(),
        };
        match cell.error_code() {
            Some(code) => Err(code),
            None => Ok(cell),
        }
    }

    fn table(self) -> Vec<Vec<CellValue>> {
        match self {
            Value::Cell(c) => vec![vec![c]],
            Value::Table(t) => t,
        }
    }

    fn into_cell(self) -> CellValue {
        match self {
            Value::Cell(c) => c,
            Value::Table(t) => t
                .into_iter()
                .next()
                .and_then(|r| r.into_iter().next())
                .unwrap_or_default(),
        }
    }
}

fn scalar_text(value: &CellValue) -> String {
    value.to_string()
}

fn scalar_number(value: &CellValue) -> Result<f64, Code> {
    match value {
        CellValue::Number(n) => Ok(*n),
        CellValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        CellValue::Text(s) => s.trim().parse().map_err(|_| VALUE_ERROR),
        CellValue::Null => Ok(0.0),
    }
}

fn scalar_bool(value: &CellValue) -> Result<bool, Code> {
    match value {
        CellValue::Bool(b) => Ok(*b),
        CellValue::Number(n) => Ok(*n != 0.0),
        CellValue::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        CellValue::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        CellValue::Null => Ok(false),
        CellValue::Text(_) => Err(VALUE_ERROR),
    }
}

/// Equality used by lookups: text compares case-insensitively and blanks
/// never match.
fn lookup_eq(a: &CellValue, b: &CellValue) -> bool {
    match (a, b) {
        (CellValue::Text(x), CellValue::Text(y)) => {
            !x.is_empty() && x.to_lowercase() == y.to_lowercase()
        }
        (CellValue::Number(x), CellValue::Number(y)) => x == y,
        (CellValue::Bool(x), CellValue::Bool(y)) => x == y,
        _ => false,
    }
}

fn sort_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Number(_) => 0,
        CellValue::Text(_) => 1,
        CellValue::Bool(_) => 2,
        CellValue::Null => 3,
    }
}

fn sort_cmp(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (CellValue::Text(x), CellValue::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        _ => sort_rank(a).cmp(&sort_rank(b)),
    }
}

fn criterion_matches(cell: &CellValue, criterion: &CellValue) -> bool {
    let Some(text) = criterion.as_text() else {
        return lookup_eq(cell, criterion);
    };

    let (op, rest) = ["<>", ">=", "<=", "=", ">", "<"]
        .iter()
        .find_map(|op| text.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", text));
    if op.is_empty() {
        return lookup_eq(cell, criterion);
    }

    let rhs = match rest.trim().parse::<f64>() {
        Ok(n) => CellValue::Number(n),
        Err(_) => CellValue::Text(rest.to_string()),
    };
    match op {
        "=" => lookup_eq(cell, &rhs),
        "<>" => !lookup_eq(cell, &rhs),
        _ => {
            if cell.is_blank() || sort_rank(cell) != sort_rank(&rhs) {
                return false;
            }
            let ord = sort_cmp(cell, &rhs);
            match op {
                ">" => ord == Ordering::Greater,
                ">=" => ord != Ordering::Less,
                "<" => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            }
        }
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Evaluates cells and formulas against one spreadsheet.
pub(crate) struct Evaluator<'a> {
    book: &'a Spreadsheet,
}

impl<'a> Evaluator<'a> {
    pub fn new(book: &'a Spreadsheet) -> Self {
        Self { book }
    }

    /// Computed value of the cell at `row`/`col` of `sheet`.
    pub fn cell_value(&self, sheet: &Sheet, row: u32, col: usize, depth: usize) -> CellValue {
        let raw = sheet.grid.get(row, col);
        match raw.as_text() {
            Some(formula) if raw.is_formula() && !sheet.grid.is_literal(row, col) => {
                self.formula(formula, sheet, row, depth)
            }
            _ => raw.clone(),
        }
    }

    /// Evaluate `formula` (leading `=` included) as if it sat in `row` of
    /// `sheet`.
    pub fn formula(&self, formula: &str, sheet: &Sheet, row: u32, depth: usize) -> CellValue {
        if depth > MAX_DEPTH {
            return CellValue::from(REF_ERROR);
        }
        let Some(expr) = parse(formula.trim_start_matches('=')) else {
            trace!(formula, "formula parse error");
            return CellValue::from(ERROR_VALUE);
        };
        let ctx = Ctx { sheet, row, depth };
        match self.eval(&expr, &ctx) {
            Ok(value) => value.into_cell(),
            Err(code) => CellValue::from(code),
        }
    }

    /// Computed values of `range`, one row per sheet row up to the used
    /// height.
    pub fn range_values(&self, sheet: &Sheet, range: &A1Range, depth: usize) -> Vec<Vec<CellValue>> {
        let end = sheet.grid.effective_end(range);
        (range.start_row..=end)
            .map(|row| {
                (range.start_col..=range.end_col)
                    .map(|col| self.cell_value(sheet, row, col, depth))
                    .collect()
            })
            .collect()
    }

    fn resolve(&self, reference: &str, ctx: &Ctx<'_>) -> Result<(&'a Sheet, A1Range), Code> {
        let range = A1Range::parse(&reference.replace('$', "")).map_err(|_| REF_ERROR)?;
        let sheet = match &range.sheet {
            Some(name) => self.book.sheet(name).ok_or(REF_ERROR)?,
            None => self.book.sheet(&ctx.sheet.name).ok_or(REF_ERROR)?,
        };
        Ok((sheet, range))
    }

    fn eval(&self, expr: &Expr, ctx: &Ctx<'_>) -> Result<Value, Code> {
        match expr {
            Expr::Literal(value) => Ok(Value::Cell(value.clone())),
            Expr::Ref(reference) => {
                let (sheet, range) = self.resolve(reference, ctx)?;
                if range.is_single_cell() {
                    Ok(Value::Cell(self.cell_value(
                        sheet,
                        range.start_row,
                        range.start_col,
                        ctx.depth + 1,
                    )))
                } else {
                    Ok(Value::Table(self.range_values(sheet, &range, ctx.depth + 1)))
                }
            }
            Expr::Array(rows) => {
                let mut out: Vec<Vec<CellValue>> = Vec::new();
                let mut width = None;
                for row in rows {
                    let block = self.hconcat(row, ctx)?;
                    let block_width = block.first().map(Vec::len);
                    if let (Some(w), Some(bw)) = (width, block_width) {
                        if w != bw {
                            return Err(VALUE_ERROR);
                        }
                    }
                    width = width.or(block_width);
                    out.extend(block);
                }
                Ok(Value::Table(out))
            }
            Expr::Call(name, args) => self.call(name, args, ctx),
        }
    }

    fn hconcat(&self, items: &[Expr], ctx: &Ctx<'_>) -> Result<Vec<Vec<CellValue>>, Code> {
        let mut out: Option<Vec<Vec<CellValue>>> = None;
        for item in items {
            let table = self.eval(item, ctx)?.table();
            out = Some(match out {
                None => table,
                Some(mut acc) => {
                    if acc.len() != table.len() {
                        return Err(VALUE_ERROR);
                    }
                    for (left, right) in acc.iter_mut().zip(table) {
                        left.extend(right);
                    }
                    acc
                }
            });
        }
        Ok(out.unwrap_or_default())
    }

    fn arg(&self, args: &[Expr], i: usize, ctx: &Ctx<'_>) -> Result<Value, Code> {
        let expr = args.get(i).ok_or(NA_VALUE)?;
        self.eval(expr, ctx)
    }

    fn call(&self, name: &str, args: &[Expr], ctx: &Ctx<'_>) -> Result<Value, Code> {
        match name {
            "ARRAYFORMULA" => self.arg(args, 0, ctx),
            "ROW" => self.row(args, ctx),
            "IFERROR" => {
                let fallback = || match args.get(1) {
                    Some(expr) => self.eval(expr, ctx),
                    None => Ok(Value::Cell(CellValue::Null)),
                };
                match self.arg(args, 0, ctx) {
                    Ok(Value::Cell(c)) if c.error_code().is_some() => fallback(),
                    Ok(value) => Ok(value),
                    Err(_) => fallback(),
                }
            }
            "JOIN" => {
                let delimiter = scalar_text(&self.arg(args, 0, ctx)?.scalar()?);
                let mut parts = Vec::new();
                for i in 1..args.len() {
                    for cell in self.arg(args, i, ctx)?.table().into_iter().flatten() {
                        if let Some(code) = cell.error_code() {
                            return Err(code);
                        }
                        parts.push(cell.to_string());
                    }
                }
                Ok(Value::Cell(CellValue::Text(parts.join(&delimiter))))
            }
            "QUERY" => {
                let data = self.arg(args, 0, ctx)?.table();
                let query = scalar_text(&self.arg(args, 1, ctx)?.scalar()?);
                let headers = match args.get(2) {
                    Some(_) => scalar_number(&self.arg(args, 2, ctx)?.scalar()?)?.max(0.0) as usize,
                    None => 0,
                };
                let rows = query::execute(data.get(headers..).unwrap_or_default(), &query)
                    .map_err(|reason| {
                        trace!(%query, %reason, "QUERY failed");
                        VALUE_ERROR
                    })?;
                if rows.is_empty() {
                    return Err(NA_VALUE);
                }
                Ok(Value::Table(rows))
            }
            "VLOOKUP" => {
                let key = self.arg(args, 0, ctx)?.scalar()?;
                let table = self.arg(args, 1, ctx)?.table();
                let index = scalar_number(&self.arg(args, 2, ctx)?.scalar()?)?;
                if index < 1.0 || index.fract() != 0.0 {
                    return Err(VALUE_ERROR);
                }
                let index = index as usize;
                if table.first().is_some_and(|r| r.len() < index) {
                    return Err(REF_ERROR);
                }
                let row = table
                    .iter()
                    .find(|row| row.first().is_some_and(|c| lookup_eq(c, &key)))
                    .ok_or(NA_VALUE)?;
                Ok(Value::Cell(row.get(index - 1).cloned().unwrap_or_default()))
            }
            "SORT" => {
                let mut table = self.arg(args, 0, ctx)?.table();
                let mut keys = Vec::new();
                let mut i = 1;
                while i < args.len() {
                    let column = scalar_number(&self.arg(args, i, ctx)?.scalar()?)?;
                    let ascending = match args.get(i + 1) {
                        Some(_) => scalar_bool(&self.arg(args, i + 1, ctx)?.scalar()?)?,
                        None => true,
                    };
                    if column < 1.0 {
                        return Err(VALUE_ERROR);
                    }
                    keys.push((column as usize - 1, ascending));
                    i += 2;
                }
                if keys.is_empty() {
                    keys.push((0, true));
                }
                table.sort_by(|a, b| {
                    keys.iter()
                        .map(|&(col, ascending)| {
                            let x = a.get(col).unwrap_or(NULL);
                            let y = b.get(col).unwrap_or(NULL);
                            match (x.is_blank(), y.is_blank()) {
                                (true, true) => Ordering::Equal,
                                (true, false) => Ordering::Greater,
                                (false, true) => Ordering::Less,
                                _ if ascending => sort_cmp(x, y),
                                _ => sort_cmp(x, y).reverse(),
                            }
                        })
                        .find(|o| *o != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
                Ok(Value::Table(table))
            }
            "MATCH" => {
                let key = self.arg(args, 0, ctx)?.scalar()?;
                let cells: Vec<CellValue> = self.arg(args, 1, ctx)?.table().into_iter().flatten().collect();
                let position = cells
                    .iter()
                    .position(|c| lookup_eq(c, &key))
                    .ok_or(NA_VALUE)?;
                Ok(Value::Cell(CellValue::Number(position as f64 + 1.0)))
            }
            "COUNTIFS" => {
                if args.is_empty() || args.len() % 2 != 0 {
                    return Err(NA_VALUE);
                }
                let mut pairs = Vec::new();
                for i in (0..args.len()).step_by(2) {
                    let cells: Vec<CellValue> =
                        self.arg(args, i, ctx)?.table().into_iter().flatten().collect();
                    let criterion = self.arg(args, i + 1, ctx)?.scalar()?;
                    pairs.push((cells, criterion));
                }
                let len = pairs[0].0.len();
                if pairs.iter().any(|(cells, _)| cells.len() != len) {
                    return Err(VALUE_ERROR);
                }
                let count = (0..len)
                    .filter(|&i| {
                        pairs
                            .iter()
                            .all(|(cells, criterion)| criterion_matches(&cells[i], criterion))
                    })
                    .count();
                Ok(Value::Cell(CellValue::Number(count as f64)))
            }
            _ => Err(NAME_ERROR),
        }
    }

    fn row(&self, args: &[Expr], ctx: &Ctx<'_>) -> Result<Value, Code> {
        let Some(expr) = args.first() else {
            return Ok(Value::Cell(CellValue::Number(f64::from(ctx.row))));
        };
        let Expr::Ref(reference) = expr else {
            return Err(VALUE_ERROR);
        };
        let (sheet, range) = self.resolve(reference, ctx)?;
        if range.is_single_cell() {
            return Ok(Value::Cell(CellValue::Number(f64::from(range.start_row))));
        }
        let end = sheet.grid.effective_end(&range);
        Ok(Value::Table(
            (range.start_row..=end)
                .map(|r| vec![CellValue::Number(f64::from(r))])
                .collect(),
        ))
    }
}

struct Ctx<'s> {
    sheet: &'s Sheet,
    row: u32,
    depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Spreadsheet {
        let mut book = Spreadsheet::new("test");
        book.add_sheet("kv");
        book.add_sheet("people");
        let kv = book.sheet_mut("kv").unwrap();
        for (row, (k, v, ts)) in [("key", "value", "_ts"), ("a", "!1", ""), ("b", "!2", "")]
            .into_iter()
            .enumerate()
        {
            kv.grid.set(row as u32 + 1, 0, k.into());
            kv.grid.set(row as u32 + 1, 1, v.into());
            if !ts.is_empty() {
                kv.grid.set(row as u32 + 1, 2, ts.into());
            }
        }
        kv.grid.set(2, 2, CellValue::Number(10.0));
        kv.grid.set(3, 2, CellValue::Number(20.0));
        kv.grid.set(4, 0, "a".into());
        kv.grid.set(4, 1, "!3".into());
        kv.grid.set(4, 2, CellValue::Number(30.0));

        let people = book.sheet_mut("people").unwrap();
        for (col, name) in ["_rid", "name", "age"].iter().enumerate() {
            people.grid.set(1, col, (*name).into());
        }
        for (row, (name, age)) in [("alice", 30.0), ("bob", 25.0), ("carol", 41.0)]
            .into_iter()
            .enumerate()
        {
            let row = row as u32 + 2;
            people.grid.set(row, 0, "=ROW()".into());
            people.grid.set(row, 1, name.into());
            people.grid.set(row, 2, CellValue::Number(age));
        }
        // tombstone
        people.grid.set(3, 0, CellValue::Null);
        people.grid.set(3, 1, CellValue::Null);
        people.grid.set(3, 2, CellValue::Null);
        book
    }

    fn eval(book: &Spreadsheet, formula: &str) -> CellValue {
        let scratch = Sheet::new(99, "scratch");
        Evaluator::new(book).formula(formula, &scratch, 1, 0)
    }

    #[test]
    fn test_vlookup_first_match_and_latest_by_sort() {
        let book = book();
        assert_eq!(
            eval(&book, r#"=VLOOKUP("a", kv!A1:C5000000, 2, FALSE)"#),
            CellValue::from("!1")
        );
        assert_eq!(
            eval(&book, r#"=VLOOKUP("a", SORT(kv!A1:C5000000, 3, FALSE), 2, FALSE)"#),
            CellValue::from("!3")
        );
        assert_eq!(
            eval(&book, r#"=VLOOKUP("zzz", kv!A1:C5000000, 2, FALSE)"#),
            CellValue::from(NA_VALUE)
        );
    }

    #[test]
    fn test_iferror_and_match() {
        let book = book();
        assert_eq!(
            eval(&book, r#"=IFERROR(VLOOKUP("zzz", SORT(kv!A1:C5000000, 3, FALSE), 3, FALSE), 0)"#),
            CellValue::Number(0.0)
        );
        assert_eq!(
            eval(&book, r#"=MATCH("b", kv!A1:A5000000, 0)"#),
            CellValue::Number(3.0)
        );
    }

    #[test]
    fn test_countifs() {
        let book = book();
        assert_eq!(
            eval(&book, r#"=COUNTIFS(kv!A1:A5000000, "a", kv!C1:C5000000, 30)"#),
            CellValue::Number(1.0)
        );
        assert_eq!(
            eval(&book, r#"=COUNTIFS(kv!A1:A5000000, "a", kv!C1:C5000000, 31)"#),
            CellValue::Number(0.0)
        );
        assert_eq!(
            eval(&book, r#"=COUNTIFS(kv!C1:C5000000, ">15")"#),
            CellValue::Number(2.0)
        );
    }

    #[test]
    fn test_row_indices_formula() {
        let book = book();
        let formula = r#"=JOIN(",", ARRAYFORMULA(QUERY({people!A2:Z, ROW(people!A2:Z)}, "select Col27 where Col1 is not null AND (Col3 > 20)")))"#;
        assert_eq!(eval(&book, formula), CellValue::from("2,4"));

        let none = r#"=JOIN(",", ARRAYFORMULA(QUERY({people!A2:Z, ROW(people!A2:Z)}, "select Col27 where Col1 is not null AND (Col3 > 100)")))"#;
        assert_eq!(eval(&book, none), CellValue::from(NA_VALUE));
    }

    #[test]
    fn test_row_formula_in_cell() {
        let book = book();
        let people = book.sheet("people").unwrap();
        assert_eq!(
            Evaluator::new(&book).cell_value(people, 4, 0, 0),
            CellValue::Number(4.0)
        );
    }

    #[test]
    fn test_errors() {
        let book = book();
        assert_eq!(eval(&book, "=NOPE(1)"), CellValue::from(NAME_ERROR));
        assert_eq!(eval(&book, "=VLOOKUP(\"a\""), CellValue::from(ERROR_VALUE));
        assert_eq!(eval(&book, "=VLOOKUP(\"a\", nosheet!A1:C3, 2, FALSE)"), CellValue::from(REF_ERROR));
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let book = book();
        assert_eq!(
            eval(&book, r#"=JOIN("", "say ""hi""")"#),
            CellValue::from("say \"hi\"")
        );
    }
}

//! Evaluator for the subset of the visualization query language the stores
//! generate:
//!
//! ```text
//! select <cols | * | count(col), ...>
//!   [where <condition>]
//!   [order by <col> [asc|desc], ...]
//!   [limit n] [offset n]
//! ```
//!
//! Columns are sheet letters (`A`, `AB`) or array positions (`Col3`).

use sheetdb_core::a1::column_index;
use sheetdb_core::CellValue;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Number(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Star,
}

fn tokenize(input: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            '*' => {
                chars.next();
                tokens.push(Tok::Star);
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, x) in chars.by_ref() {
                    if x == c {
                        closed = true;
                        break;
                    }
                    text.push(x);
                }
                if !closed {
                    return Err(format!("unterminated string at {}", start));
                }
                tokens.push(Tok::Str(text));
            }
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                }
                tokens.push(Tok::Op("="));
            }
            '!' => {
                chars.next();
                if !matches!(chars.next(), Some((_, '='))) {
                    return Err(format!("unexpected '!' at {}", start));
                }
                tokens.push(Tok::Op("!="));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some((_, '=')) => "<=",
                    Some((_, '>')) => "!=",
                    _ => "<",
                };
                if op != "<" {
                    chars.next();
                }
                tokens.push(Tok::Op(op));
            }
            '>' => {
                chars.next();
                let op = if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    ">="
                } else {
                    ">"
                };
                tokens.push(Tok::Op(op));
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut end = start;
                while let Some(&(i, x)) = chars.peek() {
                    let sign_ok = (x == '-' && i == start)
                        || ((x == '-' || x == '+')
                            && matches!(input[..i].chars().last(), Some('e' | 'E')));
                    if x.is_ascii_digit() || x == '.' || x == 'e' || x == 'E' || sign_ok {
                        end = i + x.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number {:?}", text))?;
                tokens.push(Tok::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, x)) = chars.peek() {
                    if x.is_alphanumeric() || x == '_' {
                        end = i + x.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Word(input[start..end].to_string()));
            }
            other => return Err(format!("unexpected {:?} at {}", other, start)),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Column(usize),
    Literal(CellValue),
}

#[derive(Debug, Clone, PartialEq)]
enum Cond {
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    IsNull { column: Operand, negated: bool },
    Compare(Operand, CmpOp, Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum Select {
    All,
    Columns(Vec<usize>),
    Counts(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
struct Query {
    select: Select,
    filter: Option<Cond>,
    order: Vec<(usize, bool)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), String> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {:?} at token {}", keyword, self.pos))
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), String> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            other => Err(format!("expected {:?}, found {:?}", tok, other)),
        }
    }

    fn column(&mut self) -> Result<usize, String> {
        match self.next() {
            Some(Tok::Word(w)) => column_ref(&w).ok_or_else(|| format!("unknown column {:?}", w)),
            other => Err(format!("expected column, found {:?}", other)),
        }
    }

    fn count(&mut self) -> Result<usize, String> {
        match self.next() {
            Some(Tok::Number(n)) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
            other => Err(format!("expected a count, found {:?}", other)),
        }
    }

    fn query(&mut self) -> Result<Query, String> {
        self.expect_keyword("select")?;
        let select = self.select()?;

        let filter = if self.eat_keyword("where") {
            Some(self.or()?)
        } else {
            None
        };

        let mut order = Vec::new();
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                let column = self.column()?;
                let desc = if self.eat_keyword("desc") {
                    true
                } else {
                    self.eat_keyword("asc");
                    false
                };
                order.push((column, desc));
                if self.peek() == Some(&Tok::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        let mut limit = None;
        let mut offset = None;
        loop {
            if self.eat_keyword("limit") {
                limit = Some(self.count()?);
            } else if self.eat_keyword("offset") {
                offset = Some(self.count()?);
            } else {
                break;
            }
        }

        if let Some(tok) = self.peek() {
            return Err(format!("unexpected trailing token {:?}", tok));
        }

        Ok(Query {
            select,
            filter,
            order,
            limit,
            offset,
        })
    }

    fn select(&mut self) -> Result<Select, String> {
        if self.peek() == Some(&Tok::Star) {
            self.pos += 1;
            return Ok(Select::All);
        }

        let mut columns = Vec::new();
        let mut counts = Vec::new();
        loop {
            if self.at_keyword("count") {
                self.pos += 1;
                self.expect(Tok::LParen)?;
                counts.push(self.column()?);
                self.expect(Tok::RParen)?;
            } else {
                columns.push(self.column()?);
            }
            if self.peek() == Some(&Tok::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }

        match (columns.is_empty(), counts.is_empty()) {
            (false, true) => Ok(Select::Columns(columns)),
            (true, false) => Ok(Select::Counts(counts)),
            _ => Err("aggregates cannot be mixed with plain columns".to_string()),
        }
    }

    fn or(&mut self) -> Result<Cond, String> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Cond::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Cond, String> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = Cond::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Cond, String> {
        if self.eat_keyword("not") {
            return Ok(Cond::Not(Box::new(self.not()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Cond, String> {
        if self.peek() == Some(&Tok::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            self.expect(Tok::RParen)?;
            return Ok(inner);
        }

        let left = self.operand()?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            self.expect_keyword("null")?;
            return Ok(Cond::IsNull {
                column: left,
                negated,
            });
        }

        let op = if self.eat_keyword("contains") {
            CmpOp::Contains
        } else if self.eat_keyword("starts") {
            self.expect_keyword("with")?;
            CmpOp::StartsWith
        } else if self.eat_keyword("ends") {
            self.expect_keyword("with")?;
            CmpOp::EndsWith
        } else {
            match self.next() {
                Some(Tok::Op(op)) => match op {
                    "=" => CmpOp::Eq,
                    "!=" => CmpOp::Ne,
                    "<" => CmpOp::Lt,
                    "<=" => CmpOp::Le,
                    ">" => CmpOp::Gt,
                    ">=" => CmpOp::Ge,
                    _ => return Err(format!("unknown operator {:?}", op)),
                },
                other => return Err(format!("expected operator, found {:?}", other)),
            }
        };

        let right = self.operand()?;
        Ok(Cond::Compare(left, op, right))
    }

    fn operand(&mut self) -> Result<Operand, String> {
        match self.next() {
            Some(Tok::Number(n)) => Ok(Operand::Literal(CellValue::Number(n))),
            Some(Tok::Str(s)) => Ok(Operand::Literal(CellValue::Text(s))),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("true") => {
                Ok(Operand::Literal(CellValue::Bool(true)))
            }
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("false") => {
                Ok(Operand::Literal(CellValue::Bool(false)))
            }
            Some(Tok::Word(w))
                if ["date", "datetime", "timeofday"]
                    .iter()
                    .any(|k| w.eq_ignore_ascii_case(k)) =>
            {
                match self.next() {
                    Some(Tok::Str(s)) => Ok(Operand::Literal(CellValue::Text(s))),
                    other => Err(format!("expected {} literal, found {:?}", w, other)),
                }
            }
            Some(Tok::Word(w)) => column_ref(&w)
                .map(Operand::Column)
                .ok_or_else(|| format!("unknown column {:?}", w)),
            other => Err(format!("expected operand, found {:?}", other)),
        }
    }
}

/// `A` / `AB` letters or `Col<N>` positions, both 0-based.
fn column_ref(word: &str) -> Option<usize> {
    if let Some(n) = word.strip_prefix("Col") {
        let n: usize = n.parse().ok()?;
        return n.checked_sub(1);
    }
    column_index(word)
}

fn cell(row: &[CellValue], col: usize) -> &CellValue {
    const NULL: &CellValue = &CellValue::Null;
    row.get(col).unwrap_or(NULL)
}

fn operand_value<'a>(row: &'a [CellValue], operand: &'a Operand) -> &'a CellValue {
    match operand {
        Operand::Column(col) => cell(row, *col),
        Operand::Literal(value) => value,
    }
}

fn compare_values(a: &CellValue, b: &CellValue) -> Option<Ordering> {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => Some(x.cmp(y)),
        (CellValue::Bool(x), CellValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl Cond {
    fn matches(&self, row: &[CellValue]) -> bool {
        match self {
            Cond::And(a, b) => a.matches(row) && b.matches(row),
            Cond::Or(a, b) => a.matches(row) || b.matches(row),
            Cond::Not(inner) => !inner.matches(row),
            Cond::IsNull { column, negated } => {
                operand_value(row, column).is_blank() != *negated
            }
            Cond::Compare(left, op, right) => {
                let a = operand_value(row, left);
                let b = operand_value(row, right);
                if a.is_blank() || b.is_blank() {
                    return false;
                }
                match op {
                    CmpOp::Contains | CmpOp::StartsWith | CmpOp::EndsWith => {
                        let (Some(a), Some(b)) = (a.as_text(), b.as_text()) else {
                            return false;
                        };
                        match op {
                            CmpOp::Contains => a.contains(b),
                            CmpOp::StartsWith => a.starts_with(b),
                            _ => a.ends_with(b),
                        }
                    }
                    CmpOp::Ne => compare_values(a, b) != Some(Ordering::Equal),
                    _ => {
                        let Some(ord) = compare_values(a, b) else {
                            return false;
                        };
                        match op {
                            CmpOp::Eq => ord == Ordering::Equal,
                            CmpOp::Lt => ord == Ordering::Less,
                            CmpOp::Le => ord != Ordering::Greater,
                            CmpOp::Gt => ord == Ordering::Greater,
                            _ => ord != Ordering::Less,
                        }
                    }
                }
            }
        }
    }
}

/// Sort key rank: blanks first, then numbers, text, booleans.
fn rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Null => 0,
        CellValue::Text(s) if s.is_empty() => 0,
        CellValue::Number(_) => 1,
        CellValue::Text(_) => 2,
        CellValue::Bool(_) => 3,
    }
}

fn order_values(a: &CellValue, b: &CellValue) -> Ordering {
    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
}

/// Run `query` over `table`, returning the selected rows.
pub(crate) fn execute(table: &[Vec<CellValue>], query: &str) -> Result<Vec<Vec<CellValue>>, String> {
    let mut parser = Parser {
        tokens: tokenize(query)?,
        pos: 0,
    };
    let query = parser.query()?;

    let mut rows: Vec<&Vec<CellValue>> = table
        .iter()
        .filter(|row| query.filter.as_ref().map_or(true, |c| c.matches(row)))
        .collect();

    if !query.order.is_empty() {
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|&(col, desc)| {
                    let ord = order_values(cell(a, col), cell(b, col));
                    if desc {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    if let Select::Counts(columns) = &query.select {
        let counts = columns
            .iter()
            .map(|&col| {
                let n = rows.iter().filter(|row| !cell(row, col).is_blank()).count();
                CellValue::Number(n as f64)
            })
            .collect();
        return Ok(vec![counts]);
    }

    let rows = rows
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX));

    let out = match &query.select {
        Select::All => rows.cloned().collect(),
        Select::Columns(columns) => rows
            .map(|row| columns.iter().map(|&col| cell(row, col).clone()).collect())
            .collect(),
        Select::Counts(_) => Vec::new(),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn table() -> Vec<Vec<CellValue>> {
        vec![
            vec![CellValue::Number(2.0), "alice".into(), CellValue::Number(30.0), true.into()],
            vec![CellValue::Null, "ghost".into(), CellValue::Number(99.0)],
            vec![CellValue::Number(4.0), "bob".into(), CellValue::Number(25.0), false.into()],
            vec![CellValue::Number(5.0), "carol".into(), CellValue::Number(41.0), true.into()],
        ]
    }

    #[test]
    fn test_select_where_row_exists() {
        let out = execute(&table(), "select B, C where A is not null").unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], vec![CellValue::from("alice"), CellValue::Number(30.0)]);
    }

    #[test]
    fn test_parenthesised_or() {
        let out = execute(
            &table(),
            "select B where A is not null AND (C > 40 OR B = 'bob')",
        )
        .unwrap();
        assert_eq!(out, vec![vec![text("bob")], vec![text("carol")]]);
    }

    #[test]
    fn test_order_offset_limit() {
        let out = execute(
            &table(),
            "select B where A is not null order by C DESC offset 1 limit 1",
        )
        .unwrap();
        assert_eq!(out, vec![vec![text("alice")]]);

        let out = execute(&table(), "select B where A is not null limit 1 offset 2").unwrap();
        assert_eq!(out, vec![vec![text("carol")]]);
    }

    #[test]
    fn test_count() {
        let out = execute(&table(), "select count(A) where D = true").unwrap();
        assert_eq!(out, vec![vec![CellValue::Number(2.0)]]);
    }

    #[test]
    fn test_array_positions_and_string_ops() {
        let out = execute(&table(), "select Col1 where Col2 starts with 'c' or Col2 contains 'li'").unwrap();
        assert_eq!(out, vec![vec![CellValue::Number(2.0)], vec![CellValue::Number(5.0)]]);
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let out = execute(&table(), "select B where C = '30'").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(execute(&table(), "select where").is_err());
        assert!(execute(&table(), "select B where B = 'x").is_err());
        assert!(execute(&table(), "select B, count(A)").is_err());
        assert!(execute(&table(), "select lower where A = 1").is_err());
    }

    fn numbers(values: impl IntoIterator<Item = f64>) -> Vec<Vec<CellValue>> {
        values.into_iter().map(|v| vec![CellValue::Number(v)]).collect()
    }

    proptest! {
        #[test]
        fn prop_order_by_sorts_numbers(
            values in proptest::collection::vec(-1000i32..1000, 0..40),
            desc in any::<bool>(),
        ) {
            let table = numbers(values.iter().map(|&v| v as f64));
            let direction = if desc { "DESC" } else { "ASC" };
            let out = execute(&table, &format!("select A order by A {}", direction)).unwrap();

            let mut expected = values.clone();
            expected.sort_unstable();
            if desc {
                expected.reverse();
            }
            prop_assert_eq!(out, numbers(expected.into_iter().map(f64::from)));
        }

        #[test]
        fn prop_offset_and_limit_slice_rows(n in 0usize..30, offset in 0usize..40, limit in 0usize..40) {
            let table = numbers((1..=n).map(|i| i as f64));
            let out = execute(
                &table,
                &format!("select A where A is not null offset {} limit {}", offset, limit),
            )
            .unwrap();
            let expected = numbers((1..=n).skip(offset).take(limit).map(|i| i as f64));
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn prop_count_skips_blank_cells(live in proptest::collection::vec(any::<bool>(), 0..30)) {
            let table: Vec<Vec<CellValue>> = live
                .iter()
                .enumerate()
                .map(|(i, &alive)| {
                    let rid = if alive { CellValue::Number(i as f64 + 2.0) } else { CellValue::Null };
                    vec![rid, CellValue::from("x")]
                })
                .collect();
            let out = execute(&table, "select count(A) where A is not null").unwrap();
            let expected = live.iter().filter(|&&alive| alive).count() as f64;
            prop_assert_eq!(out, vec![vec![CellValue::Number(expected)]]);
        }
    }
}

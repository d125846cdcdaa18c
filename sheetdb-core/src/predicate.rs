//! Predicate templates for row store filters.
//!
//! A template such as `name = ? AND age > ?` is scanned once into tokens.
//! Rendering then substitutes the positional arguments and rewrites mapped
//! column names to their physical references, copying everything else
//! through untouched. Text inside quoted literals is never rewritten, so a
//! `?` or a column name inside `'...'` stays as written.

use crate::column::{is_identifier_char, is_identifier_start, ColumnRefs};
use crate::error::QueryError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::iter::Peekable;
use std::str::CharIndices;

/// Query-language typed literals (`date '2021-01-01'`) pass through unquoted.
static TYPED_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(date|datetime|timeofday)\s*'[^']*'$").expect("Invalid typed literal regex")
});

/// Byte range of a token within the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `?`
    Placeholder,
    /// A bare word that may name a column.
    Identifier,
    /// A single- or double-quoted literal, quotes included.
    Literal,
    /// Operators, whitespace, numbers and anything else.
    Verbatim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

struct Scanner<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn pos(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(&(_, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            self.chars.next();
        }
    }

    fn scan(mut self) -> Result<Vec<Token>, QueryError> {
        let mut tokens: Vec<Token> = Vec::new();

        while let Some(&(start, c)) = self.chars.peek() {
            let kind = match c {
                '?' => {
                    self.chars.next();
                    TokenKind::Placeholder
                }
                '\'' | '"' => {
                    self.chars.next();
                    self.eat_while(|x| x != c);
                    if self.chars.next().is_none() {
                        return Err(QueryError::UnterminatedLiteral { start });
                    }
                    TokenKind::Literal
                }
                c if is_identifier_start(c) => {
                    self.eat_while(is_identifier_char);
                    TokenKind::Identifier
                }
                c if c.is_ascii_digit() => {
                    self.eat_while(|x| x.is_ascii_alphanumeric() || x == '.');
                    TokenKind::Verbatim
                }
                _ => {
                    self.chars.next();
                    TokenKind::Verbatim
                }
            };
            let span = Span {
                start,
                end: self.pos(),
            };

            match tokens.last_mut() {
                Some(prev) if kind == TokenKind::Verbatim && prev.kind == TokenKind::Verbatim => {
                    prev.span.end = span.end;
                }
                _ => tokens.push(Token { kind, span }),
            }
        }

        Ok(tokens)
    }
}

/// A scanned filter template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateTemplate {
    source: String,
    tokens: Vec<Token>,
}

impl PredicateTemplate {
    pub fn parse(source: impl Into<String>) -> Result<Self, QueryError> {
        let source = source.into();
        let tokens = Scanner::new(&source).scan()?;
        Ok(Self { source, tokens })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of `?` placeholders outside literals.
    pub fn placeholders(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Placeholder)
            .count()
    }

    /// Whether the template contains nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }

    /// Substitute `args` and rewrite mapped identifiers through `refs`.
    pub fn render(&self, refs: &ColumnRefs, args: &[Value]) -> Result<String, QueryError> {
        let placeholders = self.placeholders();
        if placeholders != args.len() {
            return Err(QueryError::ArgumentCountMismatch {
                placeholders,
                args: args.len(),
            });
        }

        let mut out = String::with_capacity(self.source.len());
        let mut args = args.iter().enumerate();
        for token in &self.tokens {
            let text = &self.source[token.span.start..token.span.end];
            match token.kind {
                TokenKind::Placeholder => {
                    // Counts were checked above.
                    if let Some((position, arg)) = args.next() {
                        out.push_str(&render_argument(position, arg)?);
                    }
                }
                TokenKind::Identifier => out.push_str(refs.resolve(text)),
                TokenKind::Literal | TokenKind::Verbatim => out.push_str(text),
            }
        }
        Ok(out)
    }
}

/// Render one positional argument as a query-language literal.
pub fn render_argument(position: usize, arg: &Value) -> Result<String, QueryError> {
    match arg {
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::String(s) => quote_string(position, s),
        Value::Null => Err(QueryError::UnsupportedArgument {
            position,
            kind: "null",
        }),
        Value::Array(_) => Err(QueryError::UnsupportedArgument {
            position,
            kind: "array",
        }),
        Value::Object(_) => Err(QueryError::UnsupportedArgument {
            position,
            kind: "object",
        }),
    }
}

fn quote_string(position: usize, s: &str) -> Result<String, QueryError> {
    if TYPED_LITERAL.is_match(s) {
        return Ok(s.to_string());
    }
    match (s.contains('\''), s.contains('"')) {
        (false, _) => Ok(format!("'{}'", s)),
        (true, false) => Ok(format!("\"{}\"", s)),
        (true, true) => Err(QueryError::UnquotableString { position }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn refs() -> ColumnRefs {
        ColumnRefs::new(vec![
            ("col1".to_string(), "B".to_string()),
            ("col2".to_string(), "C".to_string()),
        ])
    }

    #[test]
    fn test_render_substitutes_and_rewrites() {
        let t = PredicateTemplate::parse("col1 > ? AND col2 <= ?").unwrap();
        assert_eq!(t.placeholders(), 2);
        let out = t.render(&refs(), &[json!(100), json!(true)]).unwrap();
        assert_eq!(out, "B > 100 AND C <= true");
    }

    #[test]
    fn test_literals_are_opaque() {
        let t = PredicateTemplate::parse("col1 = 'col2 ?' AND col2 = ?").unwrap();
        assert_eq!(t.placeholders(), 1);
        let out = t.render(&refs(), &[json!("x")]).unwrap();
        assert_eq!(out, "B = 'col2 ?' AND C = 'x'");
    }

    #[test]
    fn test_unknown_identifiers_and_whitespace_pass_through() {
        let t = PredicateTemplate::parse("col3  contains   'a'").unwrap();
        assert_eq!(t.render(&refs(), &[]).unwrap(), "col3  contains   'a'");
    }

    #[test]
    fn test_numbers_are_not_identifiers() {
        let t = PredicateTemplate::parse("col1 > 2col1").unwrap();
        assert_eq!(t.render(&refs(), &[]).unwrap(), "B > 2col1");
    }

    #[test]
    fn test_argument_count_mismatch() {
        let t = PredicateTemplate::parse("col1 = ? AND col2 = ?").unwrap();
        assert_eq!(
            t.render(&refs(), &[json!(1)]),
            Err(QueryError::ArgumentCountMismatch {
                placeholders: 2,
                args: 1
            })
        );
        assert!(t.render(&refs(), &[]).is_err());
    }

    #[test]
    fn test_unterminated_literal() {
        assert_eq!(
            PredicateTemplate::parse("col1 = 'abc"),
            Err(QueryError::UnterminatedLiteral { start: 7 })
        );
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(render_argument(0, &json!("it's")).unwrap(), "\"it's\"");
        assert_eq!(render_argument(0, &json!("plain")).unwrap(), "'plain'");
        assert_eq!(
            render_argument(0, &json!("date '2021-01-01'")).unwrap(),
            "date '2021-01-01'"
        );
        assert_eq!(
            render_argument(0, &json!("timeofday'12:30:00'")).unwrap(),
            "timeofday'12:30:00'"
        );
        assert_eq!(render_argument(0, &json!("date night")).unwrap(), "'date night'");
        assert_eq!(render_argument(0, &json!("dated")).unwrap(), "'dated'");
        assert_eq!(
            render_argument(3, &json!("a'b\"c")),
            Err(QueryError::UnquotableString { position: 3 })
        );
    }

    #[test]
    fn test_unsupported_arguments() {
        assert!(matches!(
            render_argument(1, &Value::Null),
            Err(QueryError::UnsupportedArgument { position: 1, kind: "null" })
        ));
        assert!(matches!(
            render_argument(0, &json!([1, 2])),
            Err(QueryError::UnsupportedArgument { kind: "array", .. })
        ));
    }

    #[test]
    fn test_float_rendering() {
        assert_eq!(render_argument(0, &json!(1.5)).unwrap(), "1.5");
    }
}

//! Query-language builder for row store statements.
//!
//! Output shape:
//!
//! ```text
//! select <cols> where <row-exists> [AND (<predicate>)] [order by ...] [offset n] [limit n]
//! ```

use crate::column::{ColumnRefs, ROW_INDEX_COLUMN};
use crate::error::SheetDbResult;
use crate::predicate::PredicateTemplate;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Asc,
    Desc,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Asc => "ASC",
            OrderBy::Desc => "DESC",
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `order by` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOrderBy {
    pub column: String,
    pub order_by: OrderBy,
}

impl ColumnOrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order_by: OrderBy::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order_by: OrderBy::Desc,
        }
    }
}

/// Produces the mandatory leading clause of every `where`.
pub type WhereInterceptor = fn(&ColumnRefs) -> String;

/// `<rid> is not null`: only live rows match.
pub fn row_exists_interceptor(refs: &ColumnRefs) -> String {
    format!("{} is not null", refs.resolve(ROW_INDEX_COLUMN))
}

/// Builder for a single query string. Consumed by [`QueryBuilder::generate`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    refs: ColumnRefs,
    interceptor: WhereInterceptor,
    columns: Vec<String>,
    filter: Option<(String, Vec<Value>)>,
    order_by: Vec<ColumnOrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    count: bool,
}

impl QueryBuilder {
    /// An empty `columns` list selects every user column in mapping order.
    pub fn new<S: Into<String>>(
        refs: ColumnRefs,
        interceptor: WhereInterceptor,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            refs,
            interceptor,
            columns: columns.into_iter().map(Into::into).collect(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            count: false,
        }
    }

    /// Filter with a `?`-placeholder template and its positional arguments.
    pub fn where_(mut self, template: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter = Some((template.into(), args));
        self
    }

    pub fn order_by(mut self, ordering: impl IntoIterator<Item = ColumnOrderBy>) -> Self {
        self.order_by.extend(ordering);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Select `count(<rid>)` instead of columns.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn generate(self) -> SheetDbResult<String> {
        let refs = &self.refs;

        let select = if self.count {
            format!("count({})", refs.resolve(ROW_INDEX_COLUMN))
        } else if self.columns.is_empty() {
            refs.user_columns()
                .map(|c| refs.resolve(c))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            self.columns
                .iter()
                .map(|c| refs.resolve(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut query = format!("select {} where {}", select, (self.interceptor)(refs));

        if let Some((template, args)) = &self.filter {
            let predicate = PredicateTemplate::parse(template.as_str())?.render(refs, args)?;
            let predicate = predicate.trim();
            if !predicate.is_empty() {
                query.push_str(" AND (");
                query.push_str(predicate);
                query.push(')');
            }
        }

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|o| format!("{} {}", refs.resolve(&o.column), o.order_by))
                .collect::<Vec<_>>()
                .join(", ");
            query.push_str(" order by ");
            query.push_str(&terms);
        }

        if let Some(offset) = self.offset {
            query.push_str(&format!(" offset {}", offset));
        }
        if let Some(limit) = self.limit {
            query.push_str(&format!(" limit {}", limit));
        }

        Ok(query)
    }
}

//! Row filters and find options (WHERE, ORDER BY, LIMIT).
//!
//! A [`Filter`] keeps column names and bound values apart, so a driver
//! never splices caller-supplied values into statement text. The
//! in-memory driver evaluates filters directly with [`Filter::matches`].

use crate::row::Row;
use crate::value::Value;
use std::cmp::Ordering;
use std::time::Duration;

/// Comparison operators usable in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

/// A predicate over rows of one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every row
    #[default]
    All,
    /// `column <op> value`
    Cmp(String, CmpOp, Value),
    /// `column IN (values...)`
    In(String, Vec<Value>),
    /// `column IS NULL`
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(column.into(), CmpOp::Eq, value.into())
    }

    /// `column <> value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(column.into(), CmpOp::Ne, value.into())
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(column.into(), CmpOp::Lt, value.into())
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(column.into(), CmpOp::Gt, value.into())
    }

    /// `column IN (values...)`
    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    /// Exact match on every `(column, value)` pair; a NULL value matches
    /// `IS NULL`.
    pub fn all_eq<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let parts: Vec<Filter> = pairs
            .into_iter()
            .map(|(k, v)| {
                if v.is_null() {
                    Filter::IsNull(k.into())
                } else {
                    Filter::Cmp(k.into(), CmpOp::Eq, v)
                }
            })
            .collect();
        Filter::All.and_all(parts)
    }

    /// Add an AND condition.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut parts), f) => {
                parts.push(f);
                Filter::And(parts)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    fn and_all(self, others: Vec<Filter>) -> Self {
        others.into_iter().fold(self, Filter::and)
    }

    /// Add an OR condition.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, _) | (_, Filter::All) => Filter::All,
            (Filter::Or(mut parts), f) => {
                parts.push(f);
                Filter::Or(parts)
            }
            (a, b) => Filter::Or(vec![a, b]),
        }
    }

    /// Negate the filter.
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Evaluate the filter against a row.
    ///
    /// A missing column reads as NULL. Comparisons involving NULL are
    /// false, as in SQL.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::Cmp(col, op, value) => {
                let actual = row.get(col).unwrap_or(&Value::Null);
                if actual.is_null() || value.is_null() {
                    return false;
                }
                op.accepts(actual.sort_cmp(value))
            }
            Filter::In(col, values) => {
                let actual = row.get(col).unwrap_or(&Value::Null);
                !actual.is_null()
                    && values
                        .iter()
                        .any(|v| actual.sort_cmp(v) == Ordering::Equal)
            }
            Filter::IsNull(col) => row.get(col).is_none_or(Value::is_null),
            Filter::And(parts) => parts.iter().all(|f| f.matches(row)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(row)),
            Filter::Not(inner) => !inner.matches(row),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Create an ascending order by clause.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order by clause.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse `"name"`, `"name ASC"` or `"name DESC"` (case-insensitive
    /// direction). Returns `None` for an empty or malformed key.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.split_whitespace();
        let column = parts.next()?;
        let direction = match parts.next() {
            None => OrderDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => OrderDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => OrderDirection::Desc,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            column: column.to_string(),
            direction,
        })
    }

    /// Apply the direction to an ascending comparison result.
    pub fn orient(&self, ord: Ordering) -> Ordering {
        match self.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        }
    }
}

/// Options for a filtered read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort keys, earlier keys take precedence
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// How long the store may serve this result from its cache
    pub cache_ttl: Option<Duration>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: Vec<OrderBy>) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Keep explicit settings, filling the TTL from `ttl` when unset.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        if self.cache_ttl.is_none() {
            self.cache_ttl = Some(ttl);
        }
        self
    }
}

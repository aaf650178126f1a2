use super::{backtick, quote};

/// A literal on the right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl SqlValue {
    fn to_sql(&self) -> String {
        match self {
            SqlValue::String(s) => quote(s),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Null => "NULL".to_string(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::String(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One self-contained predicate of a WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Where {
    Equals { field: String, value: SqlValue },
    Differs { field: String, value: SqlValue },
    In { field: String, values: Vec<SqlValue> },
    IsNull { field: String },
    And(Vec<Where>),
}

impl Where {
    /// `field = value`, or `field IS NULL` when the value is NULL / `None`.
    pub fn equals(field: &str, value: impl Into<SqlValue>) -> Self {
        Where::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn differs(field: &str, value: impl Into<SqlValue>) -> Self {
        Where::Differs {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<SqlValue>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Where::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(field: &str) -> Self {
        Where::IsNull {
            field: field.to_string(),
        }
    }

    pub fn and(clauses: Vec<Where>) -> Self {
        Where::And(clauses)
    }

    /// Renders the predicate without the `WHERE` keyword.
    pub fn clause(&self) -> String {
        match self {
            Where::Equals {
                field,
                value: SqlValue::Null,
            } => format!("{} IS NULL", backtick(field)),
            Where::Equals { field, value } => format!("{} = {}", backtick(field), value.to_sql()),
            Where::Differs { field, value } => {
                format!("{} <> {}", backtick(field), value.to_sql())
            }
            Where::In { field, values } => format!(
                "{} IN ({})",
                backtick(field),
                values
                    .iter()
                    .map(SqlValue::to_sql)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Where::IsNull { field } => format!("{} IS NULL", backtick(field)),
            Where::And(clauses) => format!(
                "({})",
                clauses
                    .iter()
                    .map(Where::clause)
                    .collect::<Vec<_>>()
                    .join(" AND ")
            ),
        }
    }
}

/// Combines predicates with AND in a single parenthesized group.
pub(super) fn render_where(predicates: &[Where]) -> Option<String> {
    if predicates.is_empty() {
        return None;
    }

    Some(format!(
        "WHERE ({})",
        predicates
            .iter()
            .map(Where::clause)
            .collect::<Vec<_>>()
            .join(" AND ")
    ))
}

use super::where_clause::render_where;
use super::{backtick, QueryBuildError, Where};

const STATEMENT: &str = "SELECT";

/// A selected column, optionally cast with `toString()` so every catalog
/// column decodes the same way regardless of its server-side type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    to_string: bool,
}

impl Field {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            to_string: false,
        }
    }

    pub fn to_string_cast(mut self) -> Self {
        self.to_string = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn render(&self) -> String {
        let quoted = backtick(&self.name);
        if self.to_string {
            format!("toString({quoted}) AS {quoted}")
        } else {
            quoted
        }
    }
}

/// `SELECT <fields> FROM <table> [WHERE (...)];`
///
/// The table may be qualified (`system.users`); each dotted part is quoted on
/// its own.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    fields: Vec<Field>,
    from: String,
    predicates: Vec<Where>,
}

impl SelectQuery {
    pub fn new(fields: Vec<Field>, from: &str) -> Self {
        Self {
            fields,
            from: from.to_string(),
            predicates: Vec::new(),
        }
    }

    pub fn with_where(mut self, predicate: Where) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        if self.from.is_empty() {
            return Err(QueryBuildError::EmptyField {
                statement: STATEMENT,
                field: "table name",
            });
        }
        if self.fields.is_empty() {
            return Err(QueryBuildError::EmptyField {
                statement: STATEMENT,
                field: "fields",
            });
        }

        let fields = self
            .fields
            .iter()
            .map(Field::render)
            .collect::<Vec<_>>()
            .join(", ");
        let from = self
            .from
            .split('.')
            .map(backtick)
            .collect::<Vec<_>>()
            .join(".");

        let mut tokens = vec!["SELECT".to_string(), fields, "FROM".to_string(), from];
        if let Some(where_clause) = render_where(&self.predicates) {
            tokens.push(where_clause);
        }

        Ok(format!("{};", tokens.join(" ")))
    }
}

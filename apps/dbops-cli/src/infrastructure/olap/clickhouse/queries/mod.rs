//! # ClickHouse statement builders
//!
//! Builders for the DDL/DCL statements used to manage access-control objects.
//! Every builder is a plain value: configure it with the consuming `with_*`
//! methods, then call `build()` to get exactly one SQL statement or a
//! [`QueryBuildError`] naming what is missing.
//!
//! Identifiers are always backtick-quoted and string values single-quoted, with
//! backslashes escaped before the quote character. The only caller-supplied SQL
//! that is embedded verbatim is a row policy's filter expression.

mod database;
mod grant;
mod role;
mod row_policy;
mod select;
mod settings_profile;
mod user;
mod where_clause;

pub use database::{CreateDatabaseQuery, DropDatabaseQuery};
pub use grant::{GrantPrivilegeQuery, RevokePrivilegeQuery};
pub use role::{AlterRoleQuery, CreateRoleQuery, DropRoleQuery};
pub use row_policy::{
    AlterRowPolicyQuery, CreateRowPolicyQuery, DropRowPolicyQuery, RowPolicyGrantees,
};
pub use select::{Field, SelectQuery};
pub use settings_profile::{
    AlterSettingsProfileQuery, CreateSettingsProfileQuery, DropSettingsProfileQuery,
    SettingChange, SettingClause, Writability,
};
pub use user::{AlterUserQuery, CreateUserQuery, DropUserQuery, Identification};
pub use where_clause::{SqlValue, Where};

pub use super::errors::QueryBuildError;

fn backslash(s: &str) -> String {
    s.replace('\\', "\\\\")
}

/// Quotes an identifier with backticks.
pub fn backtick(s: &str) -> String {
    format!("`{}`", backslash(s).replace('`', "\\`"))
}

/// Quotes a string literal with single quotes.
pub fn quote(s: &str) -> String {
    format!("'{}'", backslash(s).replace('\'', "\\'"))
}

/// Renders a database or table name for the ON clause of GRANT/REVOKE.
///
/// ClickHouse treats `*` and a single trailing `*` (e.g. `db*`) as wildcard
/// patterns. Quoting turns them back into literal names, so those two shapes are
/// emitted bare and everything else is quoted.
pub fn identifier_or_pattern(s: &str) -> String {
    if s == "*" {
        return s.to_string();
    }

    if s.ends_with('*') && s.matches('*').count() == 1 && !s.starts_with('*') {
        return s.to_string();
    }

    backtick(s)
}

/// `ON CLUSTER` tokens, skipped when the cluster is unset or blank.
fn on_cluster(cluster: &Option<String>) -> Option<String> {
    cluster
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(|c| format!("ON CLUSTER {}", backtick(c)))
}

fn non_empty(
    value: &str,
    statement: &'static str,
    field: &'static str,
) -> Result<(), QueryBuildError> {
    if value.is_empty() {
        Err(QueryBuildError::EmptyField { statement, field })
    } else {
        Ok(())
    }
}

/// Keywords such as access types and row policy operations are emitted bare, so
/// they are restricted to letters, digits, underscores and single spaces.
fn keyword(value: &str, statement: &'static str, what: &str) -> Result<String, QueryBuildError> {
    let valid = !value.trim().is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if !valid {
        return Err(QueryBuildError::Invalid {
            statement,
            reason: format!("'{value}' is not a valid {what}"),
        });
    }

    Ok(value.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

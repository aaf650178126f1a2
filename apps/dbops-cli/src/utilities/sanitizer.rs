//! Redaction of credentials and internals from error messages before they are
//! shown to a user.
//!
//! Errors coming back from ClickHouse may echo the statement that failed, and
//! that statement may carry a password hash. Everything user-facing goes
//! through [`sanitize_error`], which keeps the gist of the failure and replaces
//! the sensitive parts with `[REDACTED]`.

use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// Patterns with three groups keep the first and third and redact the second;
/// a single group is redacted whole.
static SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Password hash in CREATE/ALTER USER
        r#"(?i)(IDENTIFIED\s+WITH\s+\w+\s+BY\s+['"])([a-fA-F0-9]{64})(['"])"#,
        r#"(?i)(password\s*[:=]\s*['"])([^'"]*?)(['"])"#,
        // Bare SHA-256 hash
        r"(?i)\b([a-fA-F0-9]{64})\b",
        r"(?i)((?:mysql|postgres|clickhouse)://[^:\s]+:)([^@\s]+)(@)",
        r"(?i)(https?://[^:\s/]+:)([^@\s]+)(@)",
        r#"(?i)((?:api[_-]?key|token|secret)['":\s=]+['"])([^'"]{8,})(['"])"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DATABASE_ERROR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(Code: \d+[^,]*,\s*e\.message\s*=\s*)([^,]+)(,.*)",
        r"(?i)(Exception:\s*)([^,\n]+)(\s*\(version.*)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static STACK_TRACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\n\s*at\s+.*?(\n|$)").unwrap());
static SQL_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(executing query:\s*)([^;]+;?)").unwrap());
static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(/[^\s:]+:\d+)").unwrap());

/// Applied in order, so longer prefixes come before the ones they contain.
const PREFIX_REWRITES: &[(&str, &str)] = &[
    ("error building query to ", "unable to "),
    ("error running query to ", "unable to "),
    ("error scanning query result to ", "unable to "),
    ("error retrieving created ", "unable to confirm created "),
    ("error building query: ", ""),
    ("error running query: ", ""),
    ("error getting ", "unable to retrieve "),
    ("error creating ", "unable to create "),
    ("error updating ", "unable to update "),
    ("error deleting ", "unable to delete "),
];

const CONNECTION_KEYWORDS: &[&str] = &[
    "connection refused",
    "connection timeout",
    "connection failed",
    "network error",
    "dial tcp",
    "no such host",
    "connection reset",
    "failed to reach clickhouse",
];

const AUTHENTICATION_KEYWORDS: &[&str] = &[
    "authentication failed",
    "access denied",
    "unauthorized",
    "invalid credentials",
    "login failed",
    "permission denied",
];

/// Where an error came from. Database errors additionally have the server's
/// exception text masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCategory {
    #[default]
    General,
    Database,
    Authentication,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation failed: {message}")]
pub struct SanitizedError {
    pub message: String,
}

pub fn sanitize_error<E: Display + ?Sized>(err: &E, category: ErrorCategory) -> SanitizedError {
    SanitizedError {
        message: sanitize_message(&err.to_string(), category),
    }
}

pub fn sanitize_message(input: &str, category: ErrorCategory) -> String {
    let mut result = input.to_string();

    for pattern in SENSITIVE_PATTERNS.iter() {
        result = pattern
            .replace_all(&result, |caps: &regex::Captures| match caps.len() {
                4 => format!("{}{REDACTED}{}", &caps[1], &caps[3]),
                _ => REDACTED.to_string(),
            })
            .into_owned();
    }

    if category == ErrorCategory::Database {
        for pattern in DATABASE_ERROR_PATTERNS.iter() {
            result = pattern
                .replace_all(&result, "${1}[DATABASE ERROR]${3}")
                .into_owned();
        }
    }

    strip_internals(&result)
}

fn strip_internals(message: &str) -> String {
    let result = STACK_TRACE.replace_all(message, "");
    let result = SQL_QUERY.replace_all(&result, "executing query: [SQL QUERY]");
    let mut result = FILE_LINE.replace_all(&result, "[FILE:LINE]").into_owned();

    for (prefix, replacement) in PREFIX_REWRITES {
        result = result.replace(prefix, replacement);
    }

    result
}

/// A generic message for the user plus sanitized details for the logs.
pub fn create_secure_error_message<E: Display + ?Sized>(
    operation: &str,
    resource_type: &str,
    err: &E,
) -> (String, String) {
    let user_message = format!(
        "Failed to {operation} {resource_type}. Please check your configuration and try again."
    );
    let technical_details = sanitize_message(&err.to_string(), ErrorCategory::Database);

    (user_message, technical_details)
}

fn contains_any(err: &(impl Display + ?Sized), keywords: &[&str]) -> bool {
    let message = err.to_string().to_lowercase();
    keywords.iter().any(|k| message.contains(k))
}

pub fn is_connection_error<E: Display + ?Sized>(err: &E) -> bool {
    contains_any(err, CONNECTION_KEYWORDS)
}

pub fn is_authentication_error<E: Display + ?Sized>(err: &E) -> bool {
    contains_any(err, AUTHENTICATION_KEYWORDS)
}

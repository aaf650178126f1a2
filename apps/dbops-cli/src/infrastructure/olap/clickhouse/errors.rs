/// Errors raised by the statement builders before anything is sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum QueryBuildError {
    #[error("{field} cannot be empty for {statement} queries")]
    EmptyField {
        statement: &'static str,
        field: &'static str,
    },
    #[error("at least one change must be specified for {statement}")]
    NoChanges { statement: &'static str },
    #[error("invalid {statement} query: {reason}")]
    Invalid {
        statement: &'static str,
        reason: String,
    },
}

/// Contract violations when reading a result row, usually a mismatch between
/// the columns a query selects and the columns the caller reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("column '{column}' is not present in the result")]
    MissingColumn { column: String },
    #[error("column '{column}' is NULL but a value was expected")]
    UnexpectedNull { column: String },
    #[error("column '{column}' holds '{value}' which is not a valid {expected}")]
    InvalidValue {
        column: String,
        value: String,
        expected: &'static str,
    },
}

/// Failures of the SQL-executing collaborator: transport, server-side
/// rejection, or an undecodable response.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to reach ClickHouse: {0}")]
    Connection(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read ClickHouse response: {0}")]
    Body(#[from] hyper::Error),
    #[error("failed to build ClickHouse request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("invalid ClickHouse url: {0}")]
    Uri(#[from] hyper::http::uri::InvalidUri),
    #[error("failed to encode query parameters: {0}")]
    Params(#[from] serde_urlencoded::ser::Error),
    #[error("ClickHouse returned status {status}: {body}")]
    Server { status: u16, body: String },
    #[error("failed to decode ClickHouse response: {0}")]
    Decode(String),
    #[error(transparent)]
    Row(#[from] RowError),
}

impl From<serde_json::Error> for ExecutorError {
    fn from(e: serde_json::Error) -> Self {
        ExecutorError::Decode(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ExecutorError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ExecutorError::Decode(e.to_string())
    }
}

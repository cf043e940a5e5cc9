use thiserror::Error;

/// Error type for flakers operations
#[derive(Debug, Error)]
pub enum FlakersError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Row {row} has {actual} value(s), schema expects {expected}")]
    SchemaMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Row {row}: value for field {field} is not a valid {expected}")]
    TypeMismatch {
        row: usize,
        field: String,
        expected: &'static str,
    },

    #[error("Schema has no fields")]
    EmptySchema,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for flakers operations
pub type Result<T> = std::result::Result<T, FlakersError>;

use serde::Serialize;
use thiserror::Error;

/// Error classification surfaced to callers alongside the message.
///
/// Matches the variants of [`AppError`] one to one so the host bridge can
/// switch on a stable identifier instead of parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    InvalidHandle,
    DuplicateConfig,
    AlreadyRunning,
    UnknownJob,
    SourceUnavailable,
    ParseError,
    Timeout,
    Cancelled,
    DatabaseError,
    InternalError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::DuplicateConfig => "DuplicateConfig",
            ErrorKind::AlreadyRunning => "AlreadyRunning",
            ErrorKind::UnknownJob => "UnknownJob",
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::DatabaseError => "DatabaseError",
            ErrorKind::InternalError => "InternalError",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, Clone, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Duplicate config: {0}")]
    DuplicateConfig(String),

    #[error("Import already running: {0}")]
    AlreadyRunning(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Parse error at byte {offset}: {message}")]
    ParseError { offset: u64, message: String },

    #[error("Import timed out: {0}")]
    Timeout(String),

    #[error("Import cancelled: {0}")]
    Cancelled(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            AppError::DuplicateConfig(_) => ErrorKind::DuplicateConfig,
            AppError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            AppError::UnknownJob(_) => ErrorKind::UnknownJob,
            AppError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            AppError::ParseError { .. } => ErrorKind::ParseError,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
            AppError::DatabaseError(_) => ErrorKind::DatabaseError,
            AppError::InternalError(_) => ErrorKind::InternalError,
        }
    }

    /// Parse failure at a known byte offset in the source.
    pub fn parse_at(offset: u64, message: impl Into<String>) -> Self {
        AppError::ParseError {
            offset,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                AppError::DatabaseError("Row not found in database".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                AppError::DatabaseError("Timed out waiting for a database connection".to_string())
            }
            _ => AppError::DatabaseError(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::SourceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("Invalid JSON: {}", err))
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        let offset = err.position().map(|p| p.byte()).unwrap_or(0);
        AppError::ParseError {
            offset,
            message: err.to_string(),
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

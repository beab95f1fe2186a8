//! Persistence error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("file backend error: {0}")]
    FileBackend(String),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::FileBackend(e.to_string())
    }
}

impl From<DbError> for messaging_types::MessagingError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::InsufficientBalance { available, required } => {
                messaging_types::MessagingError::InsufficientBalance { available, required }
            }
            other => messaging_types::MessagingError::internal(other.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

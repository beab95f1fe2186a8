//! Error taxonomy for the lock/rate backend, shaped like `messaging_db::DbError`
//! so every I/O-bound call in this crate returns a typed, bounded error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend connection failed: {0}")]
    Connection(String),

    #[error("lock backend call timed out")]
    Timeout,

    #[error("lock backend script failed: {0}")]
    ScriptError(String),
}

pub type LockResult<T> = Result<T, LockError>;

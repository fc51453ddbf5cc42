use uuid::Uuid;

use thiserror::Error;

/// Errors surfaced by the store, queue and everything built on top of them.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("could not serialize/deserialize value: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("no article with id {0}")]
    ArticleNotFound(Uuid),

    #[error("no job with id {0}")]
    JobNotFound(String),

    #[error("job {0} is already in a terminal state")]
    AlreadyTerminal(String),

    #[error("article {id} was not in the expected state {expected}, update skipped")]
    PreconditionFailed { id: Uuid, expected: String },
}

/// Where an error falls in the propagation policy from spec.md §7:
/// `Transient` storage errors are safe to retry in place with bounded
/// attempts; everything else is `Permanent` - retrying a validation
/// failure, a missing row, or a precondition mismatch can't change the
/// outcome, so callers should give up immediately instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Sqlx(inner) if is_transient_sqlx_error(inner) => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Connection-level and serialization failures are worth retrying; anything
/// that reflects the data itself (constraint violation, decode failure,
/// missing row) is not - retrying it would just fail the same way again.
fn is_transient_sqlx_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_error) => match db_error.code() {
            // serialization_failure, deadlock_detected, and the 08xxx
            // connection-exception class per the Postgres SQLSTATE tables.
            Some(code) => code == "40001" || code == "40P01" || code.starts_with("08"),
            None => false,
        },
        _ => false,
    }
}

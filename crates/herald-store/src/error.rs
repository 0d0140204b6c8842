use herald_core::types::{ClaimToken, CrontabId};
use herald_core::HeraldError;
use thiserror::Error;

/// Errors raised by the job and schedule stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The fencing token no longer denotes a valid claim on the crontab, or
    /// its schedule was deactivated while the tick was in flight.
    #[error("claim lost on crontab {crontab_id} (token {token})")]
    ClaimLost {
        crontab_id: CrontabId,
        token: ClaimToken,
    },

    /// An advance would have moved `next` backwards.
    #[error("crontab {crontab_id} cannot advance to {next}: earlier than its current next run")]
    NonMonotonicAdvance { crontab_id: CrontabId, next: String },

    /// The request was rejected before touching the database.
    #[error("invalid input: {0}")]
    Invalid(#[from] HeraldError),

    /// A previous holder of the connection lock panicked.
    #[error("connection lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call could succeed (lock contention, I/O).
    ///
    /// A lost claim, a rejected advance or invalid input will fail the same
    /// way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

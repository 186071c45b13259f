use crate::log::{LogIndex, ParticipantId};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum LeaderError {
    // Every call after `resign()`, and every promise still pending at resign time.
    #[error("Leader resigned")]
    LeaderResigned,

    #[error("Participant {0} is not a follower of this leader")]
    NotFollower(ParticipantId),

    #[error("Bad parameter: {0}")]
    BadParameter(String),

    // A delayed retry was cancelled before it fired.
    #[error("Request canceled")]
    RequestCanceled,

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage methods were handed back on resign")]
    Resigned,

    #[error("Non contiguous append: expected index {expected:?}, got {actual:?}")]
    NonContiguousAppend { expected: LogIndex, actual: LogIndex },

    #[error("Storage IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors a follower transport can fail an append-entries call with.
#[derive(Debug, thiserror::Error)]
pub enum FollowerError {
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Request canceled")]
    Canceled,
}

/// Logs and aborts. Used where an invariant is broken and no safe way forward exists.
pub(crate) fn fatal_error_exit(logger: &slog::Logger, message: &str) -> ! {
    slog::crit!(logger, "FATAL: {}", message);
    std::process::abort()
}

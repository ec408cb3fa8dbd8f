use std::time::Duration;

use thiserror::Error;

/// Errors from the OS synchronization wrappers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsError {
    #[error("Flag group wait timed out after {0:?}")]
    PendTimeout(Duration),

    #[error("Flag group was disposed while waiting")]
    Disposed,
}

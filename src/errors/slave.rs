use thiserror::Error;

use super::{DeviceError, OsError};

/// Errors surfaced by the slave pipeline and its command-lets.
#[derive(Error, Debug)]
pub enum SlaveError {
    #[error("Request data is truncated")]
    RequestTruncated,

    #[error("Response data buffer is too small")]
    ResponseTruncated,

    #[error("Application callback failed: {0}")]
    CallbackFailed(String),

    #[error("Function code {0} is invalid (valid codes are 1..=127)")]
    FunctionCodeInvalid(u8),

    #[error("Function code {0} already exists in the command table")]
    FunctionCodeExisted(u8),

    #[error("Command table is full")]
    NoFreeTableItem,

    #[error("Listen-only mode already entered")]
    ListenOnlyAlreadyEntered,

    #[error("Listen-only mode already exited")]
    ListenOnlyAlreadyExited,

    #[error("Another poll is still in progress")]
    StillPolling,

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("OS error: {0}")]
    Os(#[from] OsError),
}

impl SlaveError {
    pub fn callback_failed(details: impl Into<String>) -> Self {
        SlaveError::CallbackFailed(details.into())
    }
}

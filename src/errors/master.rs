use std::time::Duration;

use thiserror::Error;

use super::{DeviceError, OsError};

/// Errors surfaced by the master transaction pipeline and its command-lets.
#[derive(Error, Debug)]
pub enum MasterError {
    #[error("Receive buffer is too small for the response")]
    RxBufferLow,

    #[error("Transmit buffer is too small for the request")]
    TxBufferLow,

    #[error("Response data is truncated")]
    RxTruncated,

    #[error("Response function code {received:#04x} does not match request {expected:#04x}")]
    RxInvalidFunction { expected: u8, received: u8 },

    #[error("Response format is invalid: {0}")]
    RxInvalidFormat(String),

    #[error("Response came from slave {received}, expected {expected}")]
    RxInvalidSlave { expected: u8, received: u8 },

    #[error("Request could not be encoded: {0}")]
    TxBadRequest(String),

    #[error("A transaction is still in progress")]
    StillBusy,

    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Application callback failed: {0}")]
    CallbackFailed(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("OS error: {0}")]
    Os(#[from] OsError),
}

impl MasterError {
    pub fn rx_invalid_format(details: impl Into<String>) -> Self {
        MasterError::RxInvalidFormat(details.into())
    }

    pub fn callback_failed(details: impl Into<String>) -> Self {
        MasterError::CallbackFailed(details.into())
    }
}

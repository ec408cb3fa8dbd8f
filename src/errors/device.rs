use thiserror::Error;

/// Device lifecycle and serial driver errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device failure: {0}")]
    Fail(String),

    #[error("Device is already opened")]
    AlreadyOpened,

    #[error("Device is not opened")]
    NotOpened,

    #[error("Device is busy")]
    Busy,

    #[error("Device is not registered with the transmission core")]
    NotRegistered,

    #[error("Device does not support the requested transmission mode")]
    ModeMismatch,

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    pub fn fail(details: impl Into<String>) -> Self {
        DeviceError::Fail(details.into())
    }
}

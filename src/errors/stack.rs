use thiserror::Error;

use super::{
    ConfigError, CursorError, DecodeError, DeviceError, EncodeError, MasterError, OsError,
    SlaveError,
};

/// Top-level error type covering every subsystem of the stack.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("Frame decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Frame encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("OS error: {0}")]
    Os(#[from] OsError),

    #[error("Slave error: {0}")]
    Slave(#[from] SlaveError),

    #[error("Master error: {0}")]
    Master(#[from] MasterError),
}

use thiserror::Error;

/// Serial setup validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Baud rate {0} is out of the supported range (110..=921600)")]
    InvalidBaudRate(u32),

    #[error("RTU framing requires 8 data bits, got {0}")]
    RtuRequiresEightDataBits(u8),

    #[error("Buffer capacity {got} exceeds the maximum PDU data size of {max}")]
    BufferTooLarge { got: usize, max: usize },

    #[error("Unit address {0} is reserved (valid slave addresses are 1..=247)")]
    InvalidUnitAddress(u8),

    #[error("Invalid logging configuration: {0}")]
    Logging(String),
}

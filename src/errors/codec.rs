use thiserror::Error;

/// Errors raised by the RTU/ASCII frame decoders.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Decoder is in an invalid state for this operation")]
    InvalidState,

    #[error("Received character is not valid for the current framing mode")]
    InvalidChar,
}

/// Errors raised by the RTU/ASCII frame encoders.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Encoder is in an invalid state for this operation")]
    InvalidState,

    #[error("Frame already ended, no more bytes to emit")]
    FrameEnd,
}

//! Streaming frame codecs for the two Modbus serial framing modes.
//!
//! Decoders are fed one received byte at a time and reconstruct frames under
//! partial input, malformed bytes, buffer overflow and premature end of
//! frame; encoders emit one byte per pull so the transmission core can feed
//! a UART without staging the whole ADU.

pub mod ascii;
pub mod rtu;

use serde::{Deserialize, Serialize};

/// Serial-line framing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionMode {
    /// Binary framing, CRC-16 trailer, inter-frame timing delimiter.
    Rtu,
    /// Hex-encoded text framing, LRC trailer, line-feed delimiter.
    Ascii,
}

impl std::fmt::Display for TransmissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransmissionMode::Rtu => write!(f, "RTU"),
            TransmissionMode::Ascii => write!(f, "ASCII"),
        }
    }
}

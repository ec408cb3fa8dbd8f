use serde::{Deserialize, Serialize};

/// Serial stop bits. 1.5 stop bits are legal on Modbus serial lines with
/// no parity; the `serialport`-backed driver only handles 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    /// Stop-bit duration expressed in half-bit units.
    pub fn halves(&self) -> u8 {
        match self {
            StopBits::One => 2,
            StopBits::OneAndHalf => 3,
            StopBits::Two => 4,
        }
    }

    /// Conversion into the `serialport` crate's stop-bit type; `None` for
    /// 1.5 stop bits, which that crate cannot express.
    pub fn as_serialport(&self) -> Option<serialport::StopBits> {
        match self {
            StopBits::One => Some(serialport::StopBits::One),
            StopBits::OneAndHalf => None,
            StopBits::Two => Some(serialport::StopBits::Two),
        }
    }
}

impl Default for StopBits {
    fn default() -> Self {
        Self::One
    }
}

impl std::fmt::Display for StopBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopBits::One => write!(f, "1"),
            StopBits::OneAndHalf => write!(f, "1.5"),
            StopBits::Two => write!(f, "2"),
        }
    }
}

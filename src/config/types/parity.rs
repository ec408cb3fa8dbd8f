use serde::{Deserialize, Serialize};

/// Serial parity mode. Mark and space parity are accepted in the setup for
/// drivers that support them; the `serialport`-backed driver only handles
/// none/odd/even.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    /// Number of parity bits added to each character on the wire.
    pub fn bit_count(&self) -> u8 {
        match self {
            Parity::None => 0,
            _ => 1,
        }
    }

    /// Conversion into the `serialport` crate's parity type; `None` for
    /// modes that crate cannot express.
    pub fn as_serialport(&self) -> Option<serialport::Parity> {
        match self {
            Parity::None => Some(serialport::Parity::None),
            Parity::Odd => Some(serialport::Parity::Odd),
            Parity::Even => Some(serialport::Parity::Even),
            Parity::Mark | Parity::Space => None,
        }
    }
}

impl Default for Parity {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parity::None => write!(f, "none"),
            Parity::Odd => write!(f, "odd"),
            Parity::Even => write!(f, "even"),
            Parity::Mark => write!(f, "mark"),
            Parity::Space => write!(f, "space"),
        }
    }
}

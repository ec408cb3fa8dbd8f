use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::TransmissionMode;
use crate::config::types::{DataBits, Parity, StopBits};
use crate::errors::ConfigError;

/// Lowest supported baud rate.
pub const MIN_BAUD_RATE: u32 = 110;

/// Highest supported baud rate.
pub const MAX_BAUD_RATE: u32 = 921_600;

/// Serial line setup handed to the driver when the device is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/ttyAMA0".to_string(),
            baud_rate: 9600,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
        }
    }
}

impl Config {
    /// Validates the setup against the framing mode. RTU requires 8 data
    /// bits; ASCII permits 7 or 8.
    pub fn validate(&self, mode: TransmissionMode) -> Result<(), ConfigError> {
        if !(MIN_BAUD_RATE..=MAX_BAUD_RATE).contains(&self.baud_rate) {
            return Err(ConfigError::InvalidBaudRate(self.baud_rate));
        }
        if mode == TransmissionMode::Rtu && self.data_bits.get() != 8 {
            return Err(ConfigError::RtuRequiresEightDataBits(self.data_bits.get()));
        }
        Ok(())
    }

    /// Time one character occupies on the wire, in microseconds, rounded up.
    ///
    /// One character is start bit + data bits + optional parity bit + stop
    /// bits (1.5 stop bits count as three half-bits).
    pub fn character_time_us(&self) -> u32 {
        let half_bits =
            2 * (1 + self.data_bits.get() as u64 + self.parity.bit_count() as u64)
                + self.stop_bits.halves() as u64;
        let numerator = half_bits * 500_000;
        let baud = self.baud_rate as u64;
        ((numerator + baud - 1) / baud) as u32
    }

    /// Half of [`character_time_us`](Self::character_time_us), rounded up.
    /// The RTU inter-frame gates count in this unit.
    pub fn half_character_time_us(&self) -> u32 {
        (self.character_time_us() + 1) / 2
    }

    pub fn character_time(&self) -> Duration {
        Duration::from_micros(self.character_time_us() as u64)
    }

    pub fn half_character_time(&self) -> Duration {
        Duration::from_micros(self.half_character_time_us() as u64)
    }

    pub fn serial_port_info(&self) -> String {
        format!(
            "{} ({} baud, {} data bits, {} parity, {} stop bits)",
            self.device, self.baud_rate, self.data_bits, self.parity, self.stop_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_time_8n1_9600() {
        let config = Config::default();
        // 10 bits per character at 9600 baud: 1041.67 us, rounded up.
        assert_eq!(config.character_time_us(), 1042);
        assert_eq!(config.half_character_time_us(), 521);
    }

    #[test]
    fn test_character_time_8e1_19200() {
        let config = Config {
            baud_rate: 19_200,
            parity: Parity::Even,
            ..Config::default()
        };
        // 11 bits per character at 19200 baud: 572.9 us, rounded up.
        assert_eq!(config.character_time_us(), 573);
    }

    #[test]
    fn test_character_time_7e1_with_half_stop() {
        let config = Config {
            device: Config::default().device,
            baud_rate: 9600,
            data_bits: DataBits::new(7).unwrap(),
            parity: Parity::None,
            stop_bits: StopBits::OneAndHalf,
        };
        // 9.5 bits per character at 9600 baud: 989.58 us, rounded up.
        assert_eq!(config.character_time_us(), 990);
    }

    #[test]
    fn test_validate_rtu_requires_eight_data_bits() {
        let config = Config {
            data_bits: DataBits::new(7).unwrap(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(TransmissionMode::Rtu),
            Err(ConfigError::RtuRequiresEightDataBits(7))
        ));
        assert!(config.validate(TransmissionMode::Ascii).is_ok());
    }

    #[test]
    fn test_validate_baud_range() {
        let config = Config {
            baud_rate: 50,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(TransmissionMode::Rtu),
            Err(ConfigError::InvalidBaudRate(50))
        ));

        let config = Config {
            baud_rate: 921_600,
            ..Config::default()
        };
        assert!(config.validate(TransmissionMode::Rtu).is_ok());
    }
}

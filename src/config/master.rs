use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::frame::MAX_PDU_DATA_SIZE;

/// Master pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Capacity of the request scratch buffer.
    pub tx_buffer_capacity: usize,

    /// Default transaction timeout when the caller does not supply one.
    pub default_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tx_buffer_capacity: MAX_PDU_DATA_SIZE,
            default_timeout_ms: 1000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_buffer_capacity > MAX_PDU_DATA_SIZE {
            return Err(ConfigError::BufferTooLarge {
                got: self.tx_buffer_capacity,
                max: MAX_PDU_DATA_SIZE,
            });
        }
        Ok(())
    }
}

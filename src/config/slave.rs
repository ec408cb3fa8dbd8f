use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::frame::MAX_PDU_DATA_SIZE;
use crate::slave::CommandTableLayout;

/// Slave pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unit address this slave answers to (1..=247).
    pub unit_address: u8,

    /// Capacity of the request/response scratch buffers.
    pub buffer_capacity: usize,

    /// Optional pause before a unicast reply is handed to the line.
    pub delay_before_reply_ms: u64,

    /// Storage layout for the command table.
    pub command_table: CommandTableLayout,

    /// Poll tick period when no frame arrives.
    pub poll_tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit_address: 1,
            buffer_capacity: MAX_PDU_DATA_SIZE,
            delay_before_reply_ms: 0,
            command_table: CommandTableLayout::Dense,
            poll_tick_ms: 50,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unit_address == 0 || self.unit_address > 247 {
            return Err(ConfigError::InvalidUnitAddress(self.unit_address));
        }
        if self.buffer_capacity > MAX_PDU_DATA_SIZE {
            return Err(ConfigError::BufferTooLarge {
                got: self.buffer_capacity,
                max: MAX_PDU_DATA_SIZE,
            });
        }
        Ok(())
    }
}

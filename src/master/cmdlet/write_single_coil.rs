//! "Write Single Coil" (0x05) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, Command, WriteListener};

const COIL_OFF: u16 = 0x0000;
const COIL_ON: u16 = 0xFF00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleCoilRequest {
    pub address: u16,
    pub value: bool,
}

pub struct WriteSingleCoil;

impl Command for WriteSingleCoil {
    const FUNCTION: u8 = function::WRITE_SINGLE_COIL;
    type Request = WriteSingleCoilRequest;
    type Listener = dyn WriteListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        emitter
            .write_u16_be(request.address)
            .map_err(tx_buffer_low)?;
        let raw = if request.value { COIL_ON } else { COIL_OFF };
        emitter.write_u16_be(raw).map_err(tx_buffer_low)?;
        Ok(())
    }

    fn parse(
        request: &Self::Request,
        data: &[u8],
        listener: &mut Self::Listener,
    ) -> Result<(), MasterError> {
        let mut fetcher = BufferFetcher::new(data);
        let address = fetcher.read_u16_be().map_err(rx_truncated)?;
        let raw = fetcher.read_u16_be().map_err(rx_truncated)?;
        if !fetcher.is_empty() {
            return Err(MasterError::rx_invalid_format("trailing response bytes"));
        }
        let value = match raw {
            COIL_OFF => false,
            COIL_ON => true,
            other => {
                return Err(MasterError::rx_invalid_format(format!(
                    "coil value {other:#06x}"
                )));
            }
        };
        if address != request.address || value != request.value {
            return Err(MasterError::rx_invalid_format("echo does not match request"));
        }
        listener.coil_written(address, value);
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

//! "Read Holding Registers" (0x03) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, Command, RegisterReadListener};

const MAX_QUANTITY: u16 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHoldingRegistersRequest {
    pub start: u16,
    pub quantity: u16,
}

pub struct ReadHoldingRegisters;

impl Command for ReadHoldingRegisters {
    const FUNCTION: u8 = function::READ_HOLDING_REGISTERS;
    type Request = ReadHoldingRegistersRequest;
    type Listener = dyn RegisterReadListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        if request.quantity == 0 || request.quantity > MAX_QUANTITY {
            return Err(MasterError::TxBadRequest(format!(
                "register quantity {} out of range",
                request.quantity
            )));
        }
        emitter.write_u16_be(request.start).map_err(tx_buffer_low)?;
        emitter
            .write_u16_be(request.quantity)
            .map_err(tx_buffer_low)?;
        Ok(())
    }

    fn parse(
        request: &Self::Request,
        data: &[u8],
        listener: &mut Self::Listener,
    ) -> Result<(), MasterError> {
        let mut fetcher = BufferFetcher::new(data);
        let byte_count = fetcher.read_u8().map_err(rx_truncated)?;
        if byte_count as u16 != request.quantity * 2 {
            return Err(MasterError::rx_invalid_format(format!(
                "byte count {byte_count}, expected {}",
                request.quantity * 2
            )));
        }

        listener.start(request.quantity);
        for index in 0..request.quantity {
            let value = fetcher.read_u16_be().map_err(rx_truncated)?;
            listener.value(index, value);
        }
        if !fetcher.is_empty() {
            return Err(MasterError::rx_invalid_format("trailing response bytes"));
        }
        listener.end();
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

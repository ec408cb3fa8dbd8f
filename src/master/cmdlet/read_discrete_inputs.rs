//! "Read Discrete Inputs" (0x02) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, BitReadListener, Command};

const MAX_QUANTITY: u16 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDiscreteInputsRequest {
    pub start: u16,
    pub quantity: u16,
}

pub struct ReadDiscreteInputs;

impl Command for ReadDiscreteInputs {
    const FUNCTION: u8 = function::READ_DISCRETE_INPUTS;
    type Request = ReadDiscreteInputsRequest;
    type Listener = dyn BitReadListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        if request.quantity == 0 || request.quantity > MAX_QUANTITY {
            return Err(MasterError::TxBadRequest(format!(
                "discrete input quantity {} out of range",
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
        let expected = (request.quantity + 7) / 8;
        if byte_count as u16 != expected {
            return Err(MasterError::rx_invalid_format(format!(
                "byte count {byte_count}, expected {expected}"
            )));
        }
        let packed = fetcher
            .read_bytes(byte_count as usize)
            .map_err(rx_truncated)?;
        if !fetcher.is_empty() {
            return Err(MasterError::rx_invalid_format("trailing response bytes"));
        }

        listener.start(request.quantity);
        for index in 0..request.quantity {
            let value = packed[(index / 8) as usize] & (1 << (index % 8)) != 0;
            listener.value(index, value);
        }
        listener.end();
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

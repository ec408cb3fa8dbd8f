//! "Write Multiple Registers" (0x10) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, Command, WriteListener};

const MAX_QUANTITY: usize = 123;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest {
    pub start: u16,
    pub values: Vec<u16>,
}

pub struct WriteMultipleRegisters;

impl Command for WriteMultipleRegisters {
    const FUNCTION: u8 = function::WRITE_MULTIPLE_REGISTERS;
    type Request = WriteMultipleRegistersRequest;
    type Listener = dyn WriteListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        let quantity = request.values.len();
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(MasterError::TxBadRequest(format!(
                "register quantity {quantity} out of range"
            )));
        }
        emitter.write_u16_be(request.start).map_err(tx_buffer_low)?;
        emitter
            .write_u16_be(quantity as u16)
            .map_err(tx_buffer_low)?;
        emitter
            .write_u8((quantity * 2) as u8)
            .map_err(tx_buffer_low)?;
        for value in &request.values {
            emitter.write_u16_be(*value).map_err(tx_buffer_low)?;
        }
        Ok(())
    }

    fn parse(
        request: &Self::Request,
        data: &[u8],
        listener: &mut Self::Listener,
    ) -> Result<(), MasterError> {
        let mut fetcher = BufferFetcher::new(data);
        let start = fetcher.read_u16_be().map_err(rx_truncated)?;
        let quantity = fetcher.read_u16_be().map_err(rx_truncated)?;
        if !fetcher.is_empty() {
            return Err(MasterError::rx_invalid_format("trailing response bytes"));
        }
        if start != request.start || quantity as usize != request.values.len() {
            return Err(MasterError::rx_invalid_format("echo does not match request"));
        }
        listener.registers_written(start, quantity);
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

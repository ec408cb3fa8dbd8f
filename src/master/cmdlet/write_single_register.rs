//! "Write Single Register" (0x06) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, Command, WriteListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRegisterRequest {
    pub address: u16,
    pub value: u16,
}

pub struct WriteSingleRegister;

impl Command for WriteSingleRegister {
    const FUNCTION: u8 = function::WRITE_SINGLE_REGISTER;
    type Request = WriteSingleRegisterRequest;
    type Listener = dyn WriteListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        emitter
            .write_u16_be(request.address)
            .map_err(tx_buffer_low)?;
        emitter.write_u16_be(request.value).map_err(tx_buffer_low)?;
        Ok(())
    }

    fn parse(
        request: &Self::Request,
        data: &[u8],
        listener: &mut Self::Listener,
    ) -> Result<(), MasterError> {
        let mut fetcher = BufferFetcher::new(data);
        let address = fetcher.read_u16_be().map_err(rx_truncated)?;
        let value = fetcher.read_u16_be().map_err(rx_truncated)?;
        if !fetcher.is_empty() {
            return Err(MasterError::rx_invalid_format("trailing response bytes"));
        }
        if address != request.address || value != request.value {
            return Err(MasterError::rx_invalid_format("echo does not match request"));
        }
        listener.register_written(address, value);
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

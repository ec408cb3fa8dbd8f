//! "Mask Write Register" (0x16) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, Command, WriteListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWriteRegisterRequest {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
}

pub struct MaskWriteRegister;

impl Command for MaskWriteRegister {
    const FUNCTION: u8 = function::MASK_WRITE_REGISTER;
    type Request = MaskWriteRegisterRequest;
    type Listener = dyn WriteListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        emitter
            .write_u16_be(request.address)
            .map_err(tx_buffer_low)?;
        emitter
            .write_u16_be(request.and_mask)
            .map_err(tx_buffer_low)?;
        emitter
            .write_u16_be(request.or_mask)
            .map_err(tx_buffer_low)?;
        Ok(())
    }

    fn parse(
        request: &Self::Request,
        data: &[u8],
        listener: &mut Self::Listener,
    ) -> Result<(), MasterError> {
        let mut fetcher = BufferFetcher::new(data);
        let address = fetcher.read_u16_be().map_err(rx_truncated)?;
        let and_mask = fetcher.read_u16_be().map_err(rx_truncated)?;
        let or_mask = fetcher.read_u16_be().map_err(rx_truncated)?;
        if !fetcher.is_empty() {
            return Err(MasterError::rx_invalid_format("trailing response bytes"));
        }
        if address != request.address
            || and_mask != request.and_mask
            || or_mask != request.or_mask
        {
            return Err(MasterError::rx_invalid_format("echo does not match request"));
        }
        listener.mask_written(address, and_mask, or_mask);
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

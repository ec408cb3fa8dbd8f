//! "Write Multiple Coils" (0x0F) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, Command, WriteListener};

const MAX_QUANTITY: usize = 1968;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest {
    pub start: u16,
    pub values: Vec<bool>,
}

pub struct WriteMultipleCoils;

impl Command for WriteMultipleCoils {
    const FUNCTION: u8 = function::WRITE_MULTIPLE_COILS;
    type Request = WriteMultipleCoilsRequest;
    type Listener = dyn WriteListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        let quantity = request.values.len();
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(MasterError::TxBadRequest(format!(
                "coil quantity {quantity} out of range"
            )));
        }
        emitter.write_u16_be(request.start).map_err(tx_buffer_low)?;
        emitter
            .write_u16_be(quantity as u16)
            .map_err(tx_buffer_low)?;
        let byte_count = (quantity + 7) / 8;
        emitter.write_u8(byte_count as u8).map_err(tx_buffer_low)?;

        let mut packed: u8 = 0;
        for (index, value) in request.values.iter().enumerate() {
            if *value {
                packed |= 1 << (index % 8);
            }
            if index % 8 == 7 {
                emitter.write_u8(packed).map_err(tx_buffer_low)?;
                packed = 0;
            }
        }
        if quantity % 8 != 0 {
            emitter.write_u8(packed).map_err(tx_buffer_low)?;
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
        listener.coils_written(start, quantity);
        Ok(())
    }

    fn deliver_exception(listener: &mut Self::Listener, code: u8) {
        listener.exception(code);
    }
}

#[cfg(test)]
mod tests {
    use super::super::ExceptionListener;
    use super::*;

    #[derive(Default)]
    struct Recorder {
        written: Option<(u16, u16)>,
    }

    impl ExceptionListener for Recorder {}

    impl WriteListener for Recorder {
        fn coils_written(&mut self, start: u16, quantity: u16) {
            self.written = Some((start, quantity));
        }
    }

    #[test]
    fn test_build_packs_bits() {
        let request = WriteMultipleCoilsRequest {
            start: 0x0013,
            values: vec![
                true, false, true, true, false, false, true, true, true, false,
            ],
        };
        let mut buf = [0u8; 16];
        let mut emitter = BufferEmitter::new(&mut buf);
        WriteMultipleCoils::build(&request, &mut emitter).unwrap();
        // Spec example: CD 01 for this pattern.
        assert_eq!(&buf[..7], &[0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]);
    }

    #[test]
    fn test_parse_confirms_echo() {
        let request = WriteMultipleCoilsRequest {
            start: 0x0013,
            values: vec![true; 10],
        };
        let mut recorder = Recorder::default();
        WriteMultipleCoils::parse(&request, &[0x00, 0x13, 0x00, 0x0A], &mut recorder).unwrap();
        assert_eq!(recorder.written, Some((0x0013, 10)));
    }
}

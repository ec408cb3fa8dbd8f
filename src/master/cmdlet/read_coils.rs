//! "Read Coils" (0x01) master command.

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::MasterError;
use crate::frame::function;

use super::{rx_truncated, tx_buffer_low, BitReadListener, Command};

const MAX_QUANTITY: u16 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCoilsRequest {
    pub start: u16,
    pub quantity: u16,
}

/// Marker command type; the listener streams one boolean per coil in
/// ascending address order.
pub struct ReadCoils;

impl Command for ReadCoils {
    const FUNCTION: u8 = function::READ_COILS;
    type Request = ReadCoilsRequest;
    type Listener = dyn BitReadListener;

    fn build(
        request: &Self::Request,
        emitter: &mut BufferEmitter<'_>,
    ) -> Result<(), MasterError> {
        if request.quantity == 0 || request.quantity > MAX_QUANTITY {
            return Err(MasterError::TxBadRequest(format!(
                "coil quantity {} out of range",
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

#[cfg(test)]
mod tests {
    use super::super::ExceptionListener;
    use super::*;

    #[derive(Default)]
    struct Recorder {
        started: Option<u16>,
        values: Vec<(u16, bool)>,
        ended: bool,
        exception: Option<u8>,
    }

    impl ExceptionListener for Recorder {
        fn exception(&mut self, code: u8) {
            self.exception = Some(code);
        }
    }

    impl BitReadListener for Recorder {
        fn start(&mut self, count: u16) {
            self.started = Some(count);
        }
        fn value(&mut self, index: u16, value: bool) {
            self.values.push((index, value));
        }
        fn end(&mut self) {
            self.ended = true;
        }
    }

    #[test]
    fn test_build_request_pdu() {
        let mut buf = [0u8; 8];
        let mut emitter = BufferEmitter::new(&mut buf);
        let request = ReadCoilsRequest {
            start: 0x0013,
            quantity: 0x0025,
        };
        ReadCoils::build(&request, &mut emitter).unwrap();
        assert_eq!(&buf[..4], &[0x00, 0x13, 0x00, 0x25]);
    }

    #[test]
    fn test_build_rejects_zero_quantity() {
        let mut buf = [0u8; 8];
        let mut emitter = BufferEmitter::new(&mut buf);
        let request = ReadCoilsRequest {
            start: 0,
            quantity: 0,
        };
        assert!(matches!(
            ReadCoils::build(&request, &mut emitter),
            Err(MasterError::TxBadRequest(_))
        ));
    }

    #[test]
    fn test_parse_streams_in_ascending_order() {
        let request = ReadCoilsRequest {
            start: 0,
            quantity: 10,
        };
        let mut recorder = Recorder::default();
        ReadCoils::parse(&request, &[0x02, 0xCD, 0x01], &mut recorder).unwrap();

        assert_eq!(recorder.started, Some(10));
        assert!(recorder.ended);
        let expected = [true, false, true, true, false, false, true, false, true, true];
        assert_eq!(recorder.values.len(), 10);
        for (index, value) in expected.iter().enumerate() {
            assert_eq!(recorder.values[index], (index as u16, *value));
        }
    }

    #[test]
    fn test_parse_rejects_wrong_byte_count() {
        let request = ReadCoilsRequest {
            start: 0,
            quantity: 10,
        };
        let mut recorder = Recorder::default();
        assert!(matches!(
            ReadCoils::parse(&request, &[0x03, 0xCD, 0x01, 0x00], &mut recorder),
            Err(MasterError::RxInvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_truncated_response() {
        let request = ReadCoilsRequest {
            start: 0,
            quantity: 10,
        };
        let mut recorder = Recorder::default();
        assert!(matches!(
            ReadCoils::parse(&request, &[0x02, 0xCD], &mut recorder),
            Err(MasterError::RxTruncated)
        ));
    }
}

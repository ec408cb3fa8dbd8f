//! "Write Single Coil" (0x05) command implementation.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{
    callback_failed, request_truncated, response_truncated, DataModel, Handler, Request, Response,
};

const COIL_OFF: u16 = 0x0000;
const COIL_ON: u16 = 0xFF00;

/// Builds the registered handler over a shared data model.
pub fn handler<M>(model: Arc<Mutex<M>>) -> Handler
where
    M: DataModel + 'static,
{
    Box::new(move |request, response| {
        let mut model = model
            .lock()
            .map_err(|_| SlaveError::callback_failed("data model poisoned"))?;
        execute(&mut *model, request, response)
    })
}

pub(crate) fn execute<M: DataModel + ?Sized>(
    model: &mut M,
    request: &Request<'_>,
    response: &mut Response<'_>,
) -> Result<(), SlaveError> {
    let mut fetcher = BufferFetcher::new(request.data);
    let address = fetcher.read_u16_be().map_err(request_truncated)?;
    let raw_value = fetcher.read_u16_be().map_err(request_truncated)?;

    if !model.coil_valid(address) {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }
    let value = match raw_value {
        COIL_OFF => false,
        COIL_ON => true,
        _ => {
            return response.set_exception(request.function, ExceptionCode::IllegalDataValue);
        }
    };

    let emitter = response.emitter();
    emitter.write_u16_be(address).map_err(response_truncated)?;
    emitter.write_u16_be(raw_value).map_err(response_truncated)?;

    model.write_coil(address, value).map_err(callback_failed)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run, MemoryModel};
    use super::*;

    #[test]
    fn test_write_coil_on_echoes_request() {
        let mut model = MemoryModel::default();
        model.coils.insert(0x00AC, false);
        let (function, data) =
            run(&mut model, 0x05, &[0x00, 0xAC, 0xFF, 0x00], execute).unwrap();
        assert_eq!(function, 0x05);
        assert_eq!(data, [0x00, 0xAC, 0xFF, 0x00]);
        assert_eq!(model.coils[&0x00AC], true);
    }

    #[test]
    fn test_invalid_value_is_illegal_value() {
        let mut model = MemoryModel::default();
        model.coils.insert(0, false);
        let (function, data) =
            run(&mut model, 0x05, &[0x00, 0x00, 0x12, 0x34], execute).unwrap();
        assert_eq!(function, 0x85);
        assert_eq!(data, [0x03]);
        // Nothing was written.
        assert_eq!(model.coils[&0], false);
    }

    #[test]
    fn test_unmapped_coil_is_illegal_address() {
        let mut model = MemoryModel::default();
        let (function, data) =
            run(&mut model, 0x05, &[0x00, 0x00, 0xFF, 0x00], execute).unwrap();
        assert_eq!(function, 0x85);
        assert_eq!(data, [0x02]);
    }
}

//! "Write Single Register" (0x06) command implementation.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{
    callback_failed, request_truncated, response_truncated, DataModel, Handler, Request, Response,
};

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
    let value = fetcher.read_u16_be().map_err(request_truncated)?;

    if !model.holding_register_valid(address) {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    let emitter = response.emitter();
    emitter.write_u16_be(address).map_err(response_truncated)?;
    emitter.write_u16_be(value).map_err(response_truncated)?;

    model
        .write_holding_register(address, value)
        .map_err(callback_failed)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run, MemoryModel};
    use super::*;

    #[test]
    fn test_write_register_echoes_request() {
        let mut model = MemoryModel::default();
        model.holding_registers.insert(0x0001, 0);
        let (function, data) =
            run(&mut model, 0x06, &[0x00, 0x01, 0x12, 0x34], execute).unwrap();
        assert_eq!(function, 0x06);
        assert_eq!(data, [0x00, 0x01, 0x12, 0x34]);
        assert_eq!(model.holding_registers[&0x0001], 0x1234);
    }

    #[test]
    fn test_unmapped_register_is_illegal_address() {
        let mut model = MemoryModel::default();
        let (function, data) =
            run(&mut model, 0x06, &[0x00, 0x05, 0x00, 0xFF], execute).unwrap();
        assert_eq!(function, 0x86);
        assert_eq!(data, [0x02]);
    }

    #[test]
    fn test_truncated_request() {
        let mut model = MemoryModel::default();
        let result = run(&mut model, 0x06, &[0x00, 0x01, 0x12], execute);
        assert!(matches!(result, Err(SlaveError::RequestTruncated)));
    }
}

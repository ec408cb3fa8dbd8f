//! "Write Multiple Registers" (0x10) command implementation.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{
    callback_failed, range_fits, read_range, request_truncated, response_truncated, DataModel,
    Handler, Request, Response,
};

const MAX_QUANTITY: u16 = 123;

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
    let (start, quantity) = read_range(&mut fetcher)?;
    let byte_count = fetcher.read_u8().map_err(request_truncated)?;

    if quantity == 0 || quantity > MAX_QUANTITY || byte_count as u16 != quantity * 2 {
        return response.set_exception(request.function, ExceptionCode::IllegalDataValue);
    }
    if !range_fits(start, quantity)
        || (0..quantity).any(|index| !model.holding_register_valid(start + index))
    {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    for index in 0..quantity {
        let value = fetcher.read_u16_be().map_err(request_truncated)?;
        model
            .write_holding_register(start + index, value)
            .map_err(callback_failed)?;
    }

    let emitter = response.emitter();
    emitter.write_u16_be(start).map_err(response_truncated)?;
    emitter.write_u16_be(quantity).map_err(response_truncated)?;
    Ok(())
}

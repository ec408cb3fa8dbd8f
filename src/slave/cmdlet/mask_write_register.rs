//! "Mask Write Register" (0x16) command implementation.

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
    let and_mask = fetcher.read_u16_be().map_err(request_truncated)?;
    let or_mask = fetcher.read_u16_be().map_err(request_truncated)?;

    if !model.holding_register_valid(address) {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    let current = model
        .read_holding_register(address)
        .map_err(callback_failed)?;
    let result = (current & and_mask) | (or_mask & !and_mask);
    model
        .write_holding_register(address, result)
        .map_err(callback_failed)?;

    let emitter = response.emitter();
    emitter.write_u16_be(address).map_err(response_truncated)?;
    emitter.write_u16_be(and_mask).map_err(response_truncated)?;
    emitter.write_u16_be(or_mask).map_err(response_truncated)?;
    Ok(())
}

//! "Read Coils" (0x01) command implementation.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{emit_packed_bits, range_fits, read_range, DataModel, Handler, Request, Response};

const MAX_QUANTITY: u16 = 2000;

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

    if quantity == 0 || quantity > MAX_QUANTITY {
        return response.set_exception(request.function, ExceptionCode::IllegalDataValue);
    }
    if !range_fits(start, quantity)
        || (0..quantity).any(|index| !model.coil_valid(start + index))
    {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    emit_packed_bits(response.emitter(), start, quantity, |address| {
        model.read_coil(address)
    })
}

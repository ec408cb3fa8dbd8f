//! "Read Holding Registers" (0x03) command implementation.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{
    callback_failed, range_fits, read_range, response_truncated, DataModel, Handler, Request,
    Response,
};

const MAX_QUANTITY: u16 = 125;

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
        || (0..quantity).any(|index| !model.holding_register_valid(start + index))
    {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    let emitter = response.emitter();
    emitter
        .write_u8((quantity * 2) as u8)
        .map_err(response_truncated)?;
    for index in 0..quantity {
        let value = model
            .read_holding_register(start + index)
            .map_err(callback_failed)?;
        emitter.write_u16_be(value).map_err(response_truncated)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run, MemoryModel};
    use super::*;

    #[test]
    fn test_read_two_registers() {
        let mut model = MemoryModel::default();
        model.holding_registers.insert(0, 0xAE41);
        model.holding_registers.insert(1, 0x5652);
        let (function, data) =
            run(&mut model, 0x03, &[0x00, 0x00, 0x00, 0x02], execute).unwrap();
        assert_eq!(function, 0x03);
        assert_eq!(data, [0x04, 0xAE, 0x41, 0x56, 0x52]);
    }

    #[test]
    fn test_quantity_over_125_is_illegal_value() {
        let mut model = MemoryModel::default();
        let (function, data) =
            run(&mut model, 0x03, &[0x00, 0x00, 0x00, 0x7E], execute).unwrap();
        assert_eq!(function, 0x83);
        assert_eq!(data, [0x03]);
    }

    #[test]
    fn test_unmapped_register_is_illegal_address() {
        let mut model = MemoryModel::default();
        model.holding_registers.insert(0, 1);
        let (function, data) =
            run(&mut model, 0x03, &[0x00, 0x00, 0x00, 0x02], execute).unwrap();
        assert_eq!(function, 0x83);
        assert_eq!(data, [0x02]);
    }
}

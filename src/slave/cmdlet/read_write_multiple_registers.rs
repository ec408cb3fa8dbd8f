//! "Read/Write Multiple Registers" (0x17) command implementation.
//!
//! The write operation is performed before the read, per the Modbus
//! application protocol.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{
    callback_failed, range_fits, read_range, request_truncated, response_truncated, DataModel,
    Handler, Request, Response,
};

const MAX_READ_QUANTITY: u16 = 125;
const MAX_WRITE_QUANTITY: u16 = 121;

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
    let (read_start, read_quantity) = read_range(&mut fetcher)?;
    let (write_start, write_quantity) = read_range(&mut fetcher)?;
    let byte_count = fetcher.read_u8().map_err(request_truncated)?;

    if read_quantity == 0
        || read_quantity > MAX_READ_QUANTITY
        || write_quantity == 0
        || write_quantity > MAX_WRITE_QUANTITY
        || byte_count as u16 != write_quantity * 2
    {
        return response.set_exception(request.function, ExceptionCode::IllegalDataValue);
    }

    let read_range_valid = range_fits(read_start, read_quantity)
        && (0..read_quantity).all(|index| model.holding_register_valid(read_start + index));
    let write_range_valid = range_fits(write_start, write_quantity)
        && (0..write_quantity).all(|index| model.holding_register_valid(write_start + index));
    if !read_range_valid || !write_range_valid {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    // Write first, then read.
    for index in 0..write_quantity {
        let value = fetcher.read_u16_be().map_err(request_truncated)?;
        model
            .write_holding_register(write_start + index, value)
            .map_err(callback_failed)?;
    }

    let emitter = response.emitter();
    emitter
        .write_u8((read_quantity * 2) as u8)
        .map_err(response_truncated)?;
    for index in 0..read_quantity {
        let value = model
            .read_holding_register(read_start + index)
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
    fn test_write_happens_before_read() {
        let mut model = MemoryModel::default();
        model.holding_registers.insert(0, 0x1111);
        model.holding_registers.insert(1, 0x2222);
        // Read 0..=1 while writing register 1 = 0xBEEF; the read must
        // observe the written value.
        let (function, data) = run(
            &mut model,
            0x17,
            &[
                0x00, 0x00, 0x00, 0x02, // read start, quantity
                0x00, 0x01, 0x00, 0x01, // write start, quantity
                0x02, 0xBE, 0xEF, // byte count, value
            ],
            execute,
        )
        .unwrap();
        assert_eq!(function, 0x17);
        assert_eq!(data, [0x04, 0x11, 0x11, 0xBE, 0xEF]);
    }

    #[test]
    fn test_bad_byte_count_is_illegal_value() {
        let mut model = MemoryModel::default();
        model.holding_registers.insert(0, 0);
        let (function, data) = run(
            &mut model,
            0x17,
            &[0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x03, 0xBE, 0xEF, 0x00],
            execute,
        )
        .unwrap();
        assert_eq!(function, 0x97);
        assert_eq!(data, [0x03]);
    }
}

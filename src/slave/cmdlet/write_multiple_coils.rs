//! "Write Multiple Coils" (0x0F) command implementation.

use std::sync::{Arc, Mutex};

use crate::cursor::BufferFetcher;
use crate::errors::SlaveError;
use crate::frame::ExceptionCode;

use super::{
    callback_failed, range_fits, read_range, request_truncated, response_truncated, DataModel,
    Handler, Request, Response,
};

const MAX_QUANTITY: u16 = 1968;

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

    let expected_bytes = (quantity + 7) / 8;
    if quantity == 0 || quantity > MAX_QUANTITY || byte_count as u16 != expected_bytes {
        return response.set_exception(request.function, ExceptionCode::IllegalDataValue);
    }
    let packed = fetcher
        .read_bytes(byte_count as usize)
        .map_err(request_truncated)?;
    if !range_fits(start, quantity)
        || (0..quantity).any(|index| !model.coil_valid(start + index))
    {
        return response.set_exception(request.function, ExceptionCode::IllegalDataAddress);
    }

    for index in 0..quantity {
        let value = packed[(index / 8) as usize] & (1 << (index % 8)) != 0;
        model
            .write_coil(start + index, value)
            .map_err(callback_failed)?;
    }

    let emitter = response.emitter();
    emitter.write_u16_be(start).map_err(response_truncated)?;
    emitter.write_u16_be(quantity).map_err(response_truncated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run, MemoryModel};
    use super::*;

    #[test]
    fn test_write_ten_coils() {
        let mut model = MemoryModel::default();
        for address in 0..10u16 {
            model.coils.insert(address, false);
        }
        // Pattern 1,0,1,1,0,0,1,0,1,1 packed LSB-first: CD 01.
        let (function, data) = run(
            &mut model,
            0x0F,
            &[0x00, 0x00, 0x00, 0x0A, 0x02, 0xCD, 0x01],
            execute,
        )
        .unwrap();
        assert_eq!(function, 0x0F);
        assert_eq!(data, [0x00, 0x00, 0x00, 0x0A]);
        let expected = [true, false, true, true, false, false, true, false, true, true];
        for (address, value) in expected.iter().enumerate() {
            assert_eq!(model.coils[&(address as u16)], *value);
        }
    }

    #[test]
    fn test_byte_count_mismatch_is_illegal_value() {
        let mut model = MemoryModel::default();
        model.coils.insert(0, false);
        let (function, data) = run(
            &mut model,
            0x0F,
            &[0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x00],
            execute,
        )
        .unwrap();
        assert_eq!(function, 0x8F);
        assert_eq!(data, [0x03]);
    }

    #[test]
    fn test_missing_payload_is_truncated() {
        let mut model = MemoryModel::default();
        let result = run(&mut model, 0x0F, &[0x00, 0x00, 0x00, 0x0A, 0x02], execute);
        assert!(matches!(result, Err(SlaveError::RequestTruncated)));
    }
}

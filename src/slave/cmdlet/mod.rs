//! Slave command-let contract and the built-in function-code handlers.
//!
//! A command-let receives the request PDU and writes the response PDU into
//! a scratch buffer. Exceptions are encoded in place (`function | 0x80`
//! plus one code byte); hard faults are returned as [`SlaveError`] values
//! and turned into `ServerDeviceFailure` exceptions by the pipeline.

pub mod mask_write_register;
pub mod read_coils;
pub mod read_discrete_inputs;
pub mod read_holding_registers;
pub mod read_input_registers;
pub mod read_write_multiple_registers;
pub mod write_multiple_coils;
pub mod write_multiple_registers;
pub mod write_single_coil;
pub mod write_single_register;

use thiserror::Error;

use crate::cursor::{BufferEmitter, BufferFetcher};
use crate::errors::{CursorError, SlaveError};
use crate::frame::{ExceptionCode, EXCEPTION_BIT};

/// Fault reported by an application data model; translated to
/// `CallbackFailed` and answered with a `ServerDeviceFailure` exception.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("data model fault: {0}")]
pub struct ModelError(pub String);

impl ModelError {
    pub fn new(details: impl Into<String>) -> Self {
        Self(details.into())
    }
}

/// Application data served by the built-in command-lets.
///
/// `*_valid` answers whether an address exists (invalid addresses produce
/// `IllegalDataAddress` exceptions); the accessors fault only on internal
/// errors. Implement just the object types the device serves; everything
/// defaults to "not present".
pub trait DataModel: Send {
    fn coil_valid(&self, _address: u16) -> bool {
        false
    }

    fn read_coil(&self, address: u16) -> Result<bool, ModelError> {
        Err(ModelError::new(format!("coil {address} not served")))
    }

    fn write_coil(&mut self, address: u16, _value: bool) -> Result<(), ModelError> {
        Err(ModelError::new(format!("coil {address} not served")))
    }

    fn discrete_input_valid(&self, _address: u16) -> bool {
        false
    }

    fn read_discrete_input(&self, address: u16) -> Result<bool, ModelError> {
        Err(ModelError::new(format!("discrete input {address} not served")))
    }

    fn holding_register_valid(&self, _address: u16) -> bool {
        false
    }

    fn read_holding_register(&self, address: u16) -> Result<u16, ModelError> {
        Err(ModelError::new(format!("holding register {address} not served")))
    }

    fn write_holding_register(&mut self, address: u16, _value: u16) -> Result<(), ModelError> {
        Err(ModelError::new(format!("holding register {address} not served")))
    }

    fn input_register_valid(&self, _address: u16) -> bool {
        false
    }

    fn read_input_register(&self, address: u16) -> Result<u16, ModelError> {
        Err(ModelError::new(format!("input register {address} not served")))
    }
}

/// Request PDU handed to a command-let.
#[derive(Debug)]
pub struct Request<'a> {
    pub function: u8,
    pub data: &'a [u8],
}

/// Response PDU being built by a command-let.
///
/// Starts as a normal response echoing the request function code;
/// [`set_exception`](Self::set_exception) discards anything written and
/// re-encodes the PDU as an exception.
#[derive(Debug)]
pub struct Response<'a> {
    function: u8,
    emitter: BufferEmitter<'a>,
}

impl<'a> Response<'a> {
    pub fn new(request_function: u8, buffer: &'a mut [u8]) -> Self {
        Self {
            function: request_function,
            emitter: BufferEmitter::new(buffer),
        }
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    pub fn is_exception(&self) -> bool {
        self.function & EXCEPTION_BIT != 0
    }

    pub fn emitter(&mut self) -> &mut BufferEmitter<'a> {
        &mut self.emitter
    }

    pub fn written(&self) -> usize {
        self.emitter.written()
    }

    /// Replaces whatever was emitted so far with an exception PDU.
    pub fn set_exception(
        &mut self,
        request_function: u8,
        code: ExceptionCode,
    ) -> Result<(), SlaveError> {
        self.function = request_function | EXCEPTION_BIT;
        self.emitter.reset();
        self.emitter
            .write_u8(code.as_byte())
            .map_err(|_| SlaveError::ResponseTruncated)
    }
}

/// A registered command handler.
pub type Handler =
    Box<dyn for<'a, 'b> FnMut(&Request<'a>, &mut Response<'b>) -> Result<(), SlaveError> + Send>;

/// Cursor underrun on the request side.
pub(crate) fn request_truncated(_: CursorError) -> SlaveError {
    SlaveError::RequestTruncated
}

/// Cursor overrun on the response side.
pub(crate) fn response_truncated(_: CursorError) -> SlaveError {
    SlaveError::ResponseTruncated
}

pub(crate) fn callback_failed(err: ModelError) -> SlaveError {
    SlaveError::CallbackFailed(err.0)
}

/// Reads the `start, quantity` pair that opens every bulk request.
pub(crate) fn read_range(fetcher: &mut BufferFetcher<'_>) -> Result<(u16, u16), SlaveError> {
    let start = fetcher.read_u16_be().map_err(request_truncated)?;
    let quantity = fetcher.read_u16_be().map_err(request_truncated)?;
    Ok((start, quantity))
}

/// True when `start..start + quantity` stays within the 16-bit address
/// space.
pub(crate) fn range_fits(start: u16, quantity: u16) -> bool {
    (start as u32) + (quantity as u32) <= 0x1_0000
}

/// Streams packed coil/discrete-input bits into the response, LSB first.
pub(crate) fn emit_packed_bits<F>(
    emitter: &mut BufferEmitter<'_>,
    start: u16,
    quantity: u16,
    mut read: F,
) -> Result<(), SlaveError>
where
    F: FnMut(u16) -> Result<bool, ModelError>,
{
    let byte_count = ((quantity + 7) / 8) as u8;
    emitter.write_u8(byte_count).map_err(response_truncated)?;

    let mut packed: u8 = 0;
    for index in 0..quantity {
        if read(start + index).map_err(callback_failed)? {
            packed |= 1 << (index % 8);
        }
        if index % 8 == 7 {
            emitter.write_u8(packed).map_err(response_truncated)?;
            packed = 0;
        }
    }
    if quantity % 8 != 0 {
        emitter.write_u8(packed).map_err(response_truncated)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixture: a small in-memory data model.

    use std::collections::HashMap;

    use super::{DataModel, ModelError};

    #[derive(Debug, Default)]
    pub struct MemoryModel {
        pub coils: HashMap<u16, bool>,
        pub discrete_inputs: HashMap<u16, bool>,
        pub holding_registers: HashMap<u16, u16>,
        pub input_registers: HashMap<u16, u16>,
        /// Forces every accessor to fault, for callback-failure paths.
        pub faulty: bool,
    }

    impl MemoryModel {
        fn guard(&self) -> Result<(), ModelError> {
            if self.faulty {
                Err(ModelError::new("injected fault"))
            } else {
                Ok(())
            }
        }
    }

    impl DataModel for MemoryModel {
        fn coil_valid(&self, address: u16) -> bool {
            self.coils.contains_key(&address)
        }

        fn read_coil(&self, address: u16) -> Result<bool, ModelError> {
            self.guard()?;
            Ok(self.coils[&address])
        }

        fn write_coil(&mut self, address: u16, value: bool) -> Result<(), ModelError> {
            self.guard()?;
            self.coils.insert(address, value);
            Ok(())
        }

        fn discrete_input_valid(&self, address: u16) -> bool {
            self.discrete_inputs.contains_key(&address)
        }

        fn read_discrete_input(&self, address: u16) -> Result<bool, ModelError> {
            self.guard()?;
            Ok(self.discrete_inputs[&address])
        }

        fn holding_register_valid(&self, address: u16) -> bool {
            self.holding_registers.contains_key(&address)
        }

        fn read_holding_register(&self, address: u16) -> Result<u16, ModelError> {
            self.guard()?;
            Ok(self.holding_registers[&address])
        }

        fn write_holding_register(&mut self, address: u16, value: u16) -> Result<(), ModelError> {
            self.guard()?;
            self.holding_registers.insert(address, value);
            Ok(())
        }

        fn input_register_valid(&self, address: u16) -> bool {
            self.input_registers.contains_key(&address)
        }

        fn read_input_register(&self, address: u16) -> Result<u16, ModelError> {
            self.guard()?;
            Ok(self.input_registers[&address])
        }
    }

    /// Runs a command-let body against a model and returns
    /// `(function, response_data)`.
    pub fn run<M, F>(
        model: &mut M,
        function: u8,
        request_data: &[u8],
        execute: F,
    ) -> Result<(u8, Vec<u8>), crate::errors::SlaveError>
    where
        M: DataModel,
        F: FnOnce(
            &mut M,
            &super::Request<'_>,
            &mut super::Response<'_>,
        ) -> Result<(), crate::errors::SlaveError>,
    {
        let mut buffer = [0u8; 252];
        let request = super::Request {
            function,
            data: request_data,
        };
        let mut response = super::Response::new(function, &mut buffer);
        execute(model, &request, &mut response)?;
        let written = response.written();
        let function = response.function();
        Ok((function, buffer[..written].to_vec()))
    }
}

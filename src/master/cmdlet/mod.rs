//! Master command-let contract and the built-in function codes.
//!
//! A command-let knows how to encode one function's request PDU and decode
//! its response PDU, delivering results through typed listener callbacks.
//! Bulk reads stream in strictly ascending address order:
//! `start(count)`, then one `value(index, …)` per item, then `end()`.

pub mod mask_write_register;
pub mod read_coils;
pub mod read_discrete_inputs;
pub mod read_holding_registers;
pub mod read_input_registers;
pub mod write_multiple_coils;
pub mod write_multiple_registers;
pub mod write_single_coil;
pub mod write_single_register;

use crate::cursor::BufferEmitter;
use crate::errors::{CursorError, MasterError};

pub use mask_write_register::{MaskWriteRegister, MaskWriteRegisterRequest};
pub use read_coils::{ReadCoils, ReadCoilsRequest};
pub use read_discrete_inputs::{ReadDiscreteInputs, ReadDiscreteInputsRequest};
pub use read_holding_registers::{ReadHoldingRegisters, ReadHoldingRegistersRequest};
pub use read_input_registers::{ReadInputRegisters, ReadInputRegistersRequest};
pub use write_multiple_coils::{WriteMultipleCoils, WriteMultipleCoilsRequest};
pub use write_multiple_registers::{WriteMultipleRegisters, WriteMultipleRegistersRequest};
pub use write_single_coil::{WriteSingleCoil, WriteSingleCoilRequest};
pub use write_single_register::{WriteSingleRegister, WriteSingleRegisterRequest};

/// One master command: request encoder plus response decoder for a single
/// function code. The master pipeline holds exactly one active command at
/// a time.
pub trait Command {
    const FUNCTION: u8;

    /// Typed request parameters.
    type Request;

    /// Typed callback receiver for the response.
    type Listener: ?Sized;

    /// Encodes the request PDU data into the transmit scratch buffer.
    fn build(request: &Self::Request, emitter: &mut BufferEmitter<'_>)
        -> Result<(), MasterError>;

    /// Decodes the response PDU data, firing the listener callbacks.
    fn parse(
        request: &Self::Request,
        data: &[u8],
        listener: &mut Self::Listener,
    ) -> Result<(), MasterError>;

    /// Routes an exception response to the listener.
    fn deliver_exception(listener: &mut Self::Listener, code: u8);
}

/// Exception delivery shared by every listener.
pub trait ExceptionListener {
    /// The slave answered with an exception response carrying this code.
    fn exception(&mut self, _code: u8) {}
}

/// Callbacks for bulk bit reads (coils, discrete inputs).
pub trait BitReadListener: ExceptionListener {
    fn start(&mut self, _count: u16) {}
    fn value(&mut self, _index: u16, _value: bool) {}
    fn end(&mut self) {}
}

/// Callbacks for bulk register reads (holding, input).
pub trait RegisterReadListener: ExceptionListener {
    fn start(&mut self, _count: u16) {}
    fn value(&mut self, _index: u16, _value: u16) {}
    fn end(&mut self) {}
}

/// Callbacks confirming write commands.
pub trait WriteListener: ExceptionListener {
    fn coil_written(&mut self, _address: u16, _value: bool) {}
    fn register_written(&mut self, _address: u16, _value: u16) {}
    fn coils_written(&mut self, _start: u16, _quantity: u16) {}
    fn registers_written(&mut self, _start: u16, _quantity: u16) {}
    fn mask_written(&mut self, _address: u16, _and_mask: u16, _or_mask: u16) {}
}

/// Cursor overrun while encoding a request.
pub(crate) fn tx_buffer_low(_: CursorError) -> MasterError {
    MasterError::TxBufferLow
}

/// Cursor underrun while decoding a response.
pub(crate) fn rx_truncated(_: CursorError) -> MasterError {
    MasterError::RxTruncated
}

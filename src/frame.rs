//! Modbus application frame, frame flags, and protocol constants.

use bitflags::bitflags;

/// Maximum PDU size (function code + data) per the Modbus spec.
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum data length inside a PDU (PDU minus the function code).
pub const MAX_PDU_DATA_SIZE: usize = 252;

/// Maximum RTU ADU size: address + PDU + two CRC bytes.
pub const MAX_RTU_ADU_SIZE: usize = 256;

/// Maximum ASCII ADU length in characters.
pub const MAX_ASCII_ADU_SIZE: usize = 513;

/// Broadcast unit address; no response is expected or sent.
pub const BROADCAST_ADDRESS: u8 = 0;

/// Highest valid function code.
pub const MAX_FUNCTION_CODE: u8 = 127;

/// Modbus public function codes implemented by the built-in command-lets.
pub mod function {
    pub const READ_COILS: u8 = 0x01;
    pub const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const READ_INPUT_REGISTERS: u8 = 0x04;
    pub const WRITE_SINGLE_COIL: u8 = 0x05;
    pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
    pub const MASK_WRITE_REGISTER: u8 = 0x16;
    pub const READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;
}

/// Bit set on a response function code to mark an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Modbus application protocol exception codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Maps a received exception code byte back to the enum; unknown codes
    /// are preserved as `None` so the caller can still report the raw value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::ServerDeviceBusy),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetFailedToRespond),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "illegal function"),
            Self::IllegalDataAddress => write!(f, "illegal data address"),
            Self::IllegalDataValue => write!(f, "illegal data value"),
            Self::ServerDeviceFailure => write!(f, "server device failure"),
            Self::Acknowledge => write!(f, "acknowledge"),
            Self::ServerDeviceBusy => write!(f, "server device busy"),
            Self::MemoryParityError => write!(f, "memory parity error"),
            Self::GatewayPathUnavailable => write!(f, "gateway path unavailable"),
            Self::GatewayTargetFailedToRespond => write!(f, "gateway target failed to respond"),
        }
    }
}

bitflags! {
    /// Conditions observed while a frame was being received.
    ///
    /// The comms-error subset (`COMM_ERRORS`) makes a frame undeliverable;
    /// `DROP` and `REDUNDANT_BYTE` are diagnostic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u16 {
        /// Address mismatch or deliberately skipped.
        const DROP = 1 << 0;
        /// The data buffer was too small to hold the frame data.
        const BUFFER_OVERFLOW = 1 << 1;
        /// The CRC/LRC trailer did not match the computed checksum.
        const CHECKSUM_MISMATCH = 1 << 2;
        /// The frame ended before the minimum byte count arrived.
        const TRUNCATED = 1 << 3;
        /// Bytes arrived after the end-of-frame delimiter was observed.
        const REDUNDANT_BYTE = 1 << 4;
        /// A non-hex character arrived inside an ASCII frame body.
        const INVALID_BYTE = 1 << 5;
        /// Mirrored from the driver: parity error during this frame.
        const PARITY_ERROR = 1 << 6;
        /// Mirrored from the driver: receive overrun during this frame.
        const OVERRUN_ERROR = 1 << 7;
        /// Mirrored from the driver: framing error during this frame.
        const FRAME_ERROR = 1 << 8;
    }
}

impl FrameFlags {
    /// The subset that counts as a communication error for the bus
    /// counters and makes the frame undeliverable.
    pub const COMM_ERRORS: FrameFlags = FrameFlags::CHECKSUM_MISMATCH
        .union(FrameFlags::TRUNCATED)
        .union(FrameFlags::INVALID_BYTE)
        .union(FrameFlags::BUFFER_OVERFLOW)
        .union(FrameFlags::PARITY_ERROR)
        .union(FrameFlags::OVERRUN_ERROR)
        .union(FrameFlags::FRAME_ERROR);

    /// True when the frame carries a usable application PDU.
    pub fn is_deliverable(self) -> bool {
        !self.intersects(Self::COMM_ERRORS | Self::DROP)
    }
}

/// A Modbus application frame: unit address, function code and PDU data.
///
/// The data buffer is owned by the frame; decoders hand ownership over on
/// [`to_frame`](crate::codec::rtu::RtuDecoder::to_frame) and pipelines hand
/// it to the encoders by reference. Data length never exceeds
/// [`MAX_PDU_DATA_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub function: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(address: u8, function: u8, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= MAX_PDU_DATA_SIZE);
        Self {
            address,
            function,
            data,
        }
    }

    /// True when the frame is addressed to every slave on the line.
    pub fn is_broadcast(&self) -> bool {
        self.address == BROADCAST_ADDRESS
    }

    /// True when the function code carries the exception marker bit.
    pub fn is_exception(&self) -> bool {
        self.function & EXCEPTION_BIT != 0
    }
}

/// A decoded frame together with the flags observed while receiving it.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub frame: Frame,
    pub flags: FrameFlags,
}

impl ReceivedFrame {
    /// True when the frame carries a usable application PDU.
    pub fn is_deliverable(&self) -> bool {
        self.flags.is_deliverable()
    }
}

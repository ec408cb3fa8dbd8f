//! Byte-streaming RTU frame decoder and encoder.

use tracing::trace;

use crate::checksum::Crc16;
use crate::errors::{DecodeError, EncodeError};
use crate::frame::{Frame, FrameFlags, ReceivedFrame};

/// Decoder progress through an RTU frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for the unit address byte.
    Address,
    /// Waiting for the function code byte.
    Function,
    /// Accumulating data bytes (the CRC trailer is only identified at end
    /// of frame).
    Data,
    /// End of frame observed.
    End,
}

/// Streaming RTU frame decoder.
///
/// RTU frames carry no length field, so the trailer cannot be recognized
/// until the inter-frame gap: every data byte is speculatively buffered and
/// a two-byte holdover delays CRC accumulation. A byte enters the running
/// CRC only once two younger bytes exist, which leaves exactly the received
/// trailer out of the computed checksum when the frame ends.
#[derive(Debug)]
pub struct RtuDecoder {
    state: DecoderState,
    address: u8,
    function: u8,
    data: Vec<u8>,
    capacity: usize,
    /// Data-region bytes received, including any dropped on overflow.
    received: usize,
    /// Holdover shift register: `hold_old` arrived before `hold_new`.
    hold_old: u8,
    hold_new: u8,
    held: u8,
    flags: FrameFlags,
    crc: Crc16,
}

impl RtuDecoder {
    /// Creates a decoder whose data buffer holds at most `capacity` bytes
    /// of frame data. Two extra slots are reserved internally because the
    /// CRC trailer is buffered speculatively until end of frame.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: DecoderState::Address,
            address: 0,
            function: 0,
            data: Vec::with_capacity(capacity + 2),
            capacity,
            received: 0,
            hold_old: 0,
            hold_new: 0,
            held: 0,
            flags: FrameFlags::empty(),
            crc: Crc16::new(),
        }
    }

    /// Re-arms the decoder for the next frame. Allowed in any state.
    pub fn reset(&mut self) {
        self.state = DecoderState::Address;
        self.address = 0;
        self.function = 0;
        self.data.clear();
        self.received = 0;
        self.hold_old = 0;
        self.hold_new = 0;
        self.held = 0;
        self.flags = FrameFlags::empty();
        self.crc.reset();
    }

    /// ORs externally observed conditions (driver line errors) into the
    /// flags of the frame currently being decoded.
    pub fn add_flags(&mut self, flags: FrameFlags) {
        self.flags |= flags;
    }

    /// Flags accumulated for the frame being decoded.
    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Feeds one received byte into the decoder.
    pub fn update(&mut self, byte: u8) {
        match self.state {
            DecoderState::Address => {
                self.address = byte;
                self.crc.update(byte);
                self.state = DecoderState::Function;
            }
            DecoderState::Function => {
                self.function = byte;
                self.crc.update(byte);
                self.state = DecoderState::Data;
            }
            DecoderState::Data => {
                if self.held == 2 {
                    // The oldest held byte can no longer be the trailer.
                    self.crc.update(self.hold_old);
                }
                if self.data.len() < self.capacity + 2 {
                    self.data.push(byte);
                } else {
                    self.flags |= FrameFlags::BUFFER_OVERFLOW;
                }
                self.received += 1;
                self.hold_old = self.hold_new;
                self.hold_new = byte;
                if self.held < 2 {
                    self.held += 1;
                }
            }
            DecoderState::End => {
                self.flags |= FrameFlags::REDUNDANT_BYTE;
            }
        }
    }

    /// Ends the frame; driven by the inter-frame timer expiry or an
    /// externally observed gap.
    pub fn end(&mut self) -> Result<(), DecodeError> {
        match self.state {
            DecoderState::End => return Err(DecodeError::InvalidState),
            DecoderState::Address | DecoderState::Function => {
                self.flags |= FrameFlags::TRUNCATED;
            }
            DecoderState::Data => {
                if self.received < 2 {
                    // Fewer than four bytes total: no room for a trailer.
                    self.flags |= FrameFlags::TRUNCATED;
                } else {
                    // The two youngest bytes are the trailer, low byte
                    // first on the wire.
                    let received_crc = u16::from_le_bytes([self.hold_old, self.hold_new]);
                    let computed_crc = self.crc.finalize();
                    if received_crc != computed_crc {
                        trace!(
                            computed = %format_args!("{computed_crc:04X}"),
                            received = %format_args!("{received_crc:04X}"),
                            "RTU CRC mismatch"
                        );
                        self.flags |= FrameFlags::CHECKSUM_MISMATCH;
                    }
                    // Strip the trailer from the speculatively buffered data.
                    let data_len = self.received - 2;
                    if data_len > self.capacity {
                        self.flags |= FrameFlags::BUFFER_OVERFLOW;
                    }
                    self.data.truncate(data_len.min(self.capacity));
                }
            }
        }
        self.state = DecoderState::End;
        Ok(())
    }

    /// Hands out the decoded frame and its flags. Fails unless the decoder
    /// has reached end of frame. The data buffer is moved out; callers
    /// re-arm the decoder with [`reset`](Self::reset).
    pub fn to_frame(&mut self) -> Result<ReceivedFrame, DecodeError> {
        if self.state != DecoderState::End {
            return Err(DecodeError::InvalidState);
        }
        let data = std::mem::take(&mut self.data);
        Ok(ReceivedFrame {
            frame: Frame {
                address: self.address,
                function: self.function,
                data,
            },
            flags: self.flags,
        })
    }
}

/// Encoder progress through an RTU frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Address,
    Function,
    Data,
    CrcLo,
    CrcHi,
    End,
}

/// Pull-based RTU frame encoder.
///
/// Each [`next`](Self::next) call produces exactly one wire byte; the CRC
/// is folded in as the body bytes are emitted and split on entry into the
/// trailer states.
#[derive(Debug)]
pub struct RtuEncoder<'a> {
    state: EncoderState,
    frame: &'a Frame,
    index: usize,
    crc: Crc16,
    crc_hi: u8,
}

impl<'a> RtuEncoder<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self {
            state: EncoderState::Address,
            frame,
            index: 0,
            crc: Crc16::new(),
            crc_hi: 0,
        }
    }

    /// True while there are bytes left to transmit.
    pub fn has_next(&self) -> bool {
        self.state != EncoderState::End
    }

    /// Produces the next byte to be transmitted.
    pub fn next(&mut self) -> Result<u8, EncodeError> {
        let byte = match self.state {
            EncoderState::Address => {
                self.crc.update(self.frame.address);
                self.state = EncoderState::Function;
                self.frame.address
            }
            EncoderState::Function => {
                self.crc.update(self.frame.function);
                self.state = if self.frame.data.is_empty() {
                    EncoderState::CrcLo
                } else {
                    EncoderState::Data
                };
                self.frame.function
            }
            EncoderState::Data => {
                let byte = self.frame.data[self.index];
                self.crc.update(byte);
                self.index += 1;
                if self.index >= self.frame.data.len() {
                    self.state = EncoderState::CrcLo;
                }
                byte
            }
            EncoderState::CrcLo => {
                let (lo, hi) = self.crc.finalize_bytes();
                self.crc_hi = hi;
                self.state = EncoderState::CrcHi;
                lo
            }
            EncoderState::CrcHi => {
                self.state = EncoderState::End;
                self.crc_hi
            }
            EncoderState::End => return Err(EncodeError::FrameEnd),
        };
        Ok(byte)
    }
}

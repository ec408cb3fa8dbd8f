//! Character-streaming ASCII frame decoder and encoder.

use tracing::trace;

use crate::checksum::Lrc;
use crate::errors::{DecodeError, EncodeError};
use crate::frame::{Frame, FrameFlags, ReceivedFrame};

/// Frame start delimiter.
pub const START: u8 = b':';

/// Carriage return, first end-of-frame character.
pub const CR: u8 = 0x0D;

/// Default line feed. The trailer character is configurable on the encoder
/// and the decoder accepts any configured value in its place.
pub const DEFAULT_LF: u8 = 0x0A;

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

/// Case-insensitive hex digit value.
fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Decoder progress through an ASCII frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Discarding bytes until the ':' delimiter.
    Idle,
    AddressHi,
    AddressLo,
    FunctionHi,
    FunctionLo,
    DataHi,
    DataLo,
    /// CR observed, expecting the line feed.
    LineFeed,
    /// Invalid character observed; consuming until the line feed.
    Drop,
    End,
}

/// Streaming ASCII frame decoder.
///
/// The frame starts at ':' (a ':' seen mid-frame resynchronizes the
/// decoder). Hex pairs are reduced through a nibble latch; the last
/// completed pair before CR/LF is the LRC trailer, held back from both the
/// data buffer and the running LRC by a one-byte holdover. Decoding is
/// permissive about the line ending: a lone LF terminates the frame.
#[derive(Debug)]
pub struct AsciiDecoder {
    state: DecoderState,
    partial: u8,
    address: u8,
    function: u8,
    data: Vec<u8>,
    capacity: usize,
    /// Data-region bytes committed, including any dropped on overflow.
    received: usize,
    /// Most recent completed pair; the LRC trailer candidate.
    candidate: Option<u8>,
    line_feed: u8,
    flags: FrameFlags,
    lrc: Lrc,
}

impl AsciiDecoder {
    /// Creates a decoder whose data buffer holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_line_feed(capacity, DEFAULT_LF)
    }

    /// Creates a decoder that recognizes a non-standard trailer character.
    pub fn with_line_feed(capacity: usize, line_feed: u8) -> Self {
        Self {
            state: DecoderState::Idle,
            partial: 0,
            address: 0,
            function: 0,
            data: Vec::with_capacity(capacity),
            capacity,
            received: 0,
            candidate: None,
            line_feed,
            flags: FrameFlags::empty(),
            lrc: Lrc::new(),
        }
    }

    /// Re-arms the decoder for the next frame. Allowed in any state.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.resync();
        self.flags = FrameFlags::empty();
    }

    /// Clears frame body state without touching the flags; used when a ':'
    /// restarts the frame mid-stream.
    fn resync(&mut self) {
        self.partial = 0;
        self.address = 0;
        self.function = 0;
        self.data.clear();
        self.received = 0;
        self.candidate = None;
        self.lrc.reset();
    }

    /// ORs externally observed conditions (driver line errors) into the
    /// flags of the frame currently being decoded.
    pub fn add_flags(&mut self, flags: FrameFlags) {
        self.flags |= flags;
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// True once the end-of-frame delimiter has been consumed.
    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::End
    }

    /// Feeds one received character into the decoder.
    pub fn update(&mut self, ch: u8) {
        if self.state == DecoderState::End {
            self.flags |= FrameFlags::REDUNDANT_BYTE;
            return;
        }

        if ch == START {
            // Frame restart; survives spurious leading data.
            self.resync();
            self.state = DecoderState::AddressHi;
            return;
        }

        match self.state {
            DecoderState::Idle => {
                // Silently discard until the start delimiter.
            }
            DecoderState::Drop => {
                if ch == self.line_feed {
                    self.state = DecoderState::End;
                }
            }
            DecoderState::LineFeed => {
                if ch == self.line_feed {
                    self.finalize();
                } else {
                    self.flags |= FrameFlags::INVALID_BYTE;
                    self.state = DecoderState::Drop;
                }
            }
            DecoderState::AddressHi | DecoderState::FunctionHi | DecoderState::DataHi => {
                if ch == CR {
                    self.state = DecoderState::LineFeed;
                } else if ch == self.line_feed {
                    // Permissive decode: a lone LF ends the frame.
                    self.finalize();
                } else if let Some(nibble) = hex_value(ch) {
                    self.partial = nibble << 4;
                    self.state = match self.state {
                        DecoderState::AddressHi => DecoderState::AddressLo,
                        DecoderState::FunctionHi => DecoderState::FunctionLo,
                        _ => DecoderState::DataLo,
                    };
                } else {
                    self.flags |= FrameFlags::INVALID_BYTE;
                    self.state = DecoderState::Drop;
                }
            }
            DecoderState::AddressLo | DecoderState::FunctionLo | DecoderState::DataLo => {
                if let Some(nibble) = hex_value(ch) {
                    let byte = self.partial | nibble;
                    match self.state {
                        DecoderState::AddressLo => {
                            self.address = byte;
                            self.lrc.update(byte);
                            self.state = DecoderState::FunctionHi;
                        }
                        DecoderState::FunctionLo => {
                            self.function = byte;
                            self.lrc.update(byte);
                            self.state = DecoderState::DataHi;
                        }
                        _ => {
                            // The previous candidate is now known not to be
                            // the trailer; commit it to the data region.
                            if let Some(previous) = self.candidate.take() {
                                self.commit(previous);
                            }
                            self.candidate = Some(byte);
                            self.state = DecoderState::DataHi;
                        }
                    }
                } else {
                    // CR or LF mid-pair is malformed too.
                    self.flags |= FrameFlags::INVALID_BYTE;
                    if ch == self.line_feed {
                        self.state = DecoderState::End;
                    } else {
                        self.state = DecoderState::Drop;
                    }
                }
            }
            DecoderState::End => unreachable!(),
        }
    }

    fn commit(&mut self, byte: u8) {
        if self.data.len() < self.capacity {
            self.data.push(byte);
        } else {
            self.flags |= FrameFlags::BUFFER_OVERFLOW;
        }
        self.received += 1;
        self.lrc.update(byte);
    }

    /// Separates the LRC trailer and closes the frame.
    fn finalize(&mut self) {
        match self.candidate.take() {
            None => {
                // Never got past address + function + one trailer pair.
                self.flags |= FrameFlags::TRUNCATED;
            }
            Some(received_lrc) => {
                let computed_lrc = self.lrc.finalize();
                if received_lrc != computed_lrc {
                    trace!(
                        computed = %format_args!("{computed_lrc:02X}"),
                        received = %format_args!("{received_lrc:02X}"),
                        "ASCII LRC mismatch"
                    );
                    self.flags |= FrameFlags::CHECKSUM_MISMATCH;
                }
            }
        }
        self.state = DecoderState::End;
    }

    /// Ends the frame from outside, for cores that synthesize end-of-frame
    /// instead of waiting for the line feed.
    pub fn end(&mut self) -> Result<(), DecodeError> {
        match self.state {
            DecoderState::End => Err(DecodeError::InvalidState),
            DecoderState::LineFeed | DecoderState::DataHi => {
                self.finalize();
                Ok(())
            }
            _ => {
                self.flags |= FrameFlags::TRUNCATED;
                self.state = DecoderState::End;
                Ok(())
            }
        }
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

/// Encoder progress through an ASCII frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Start,
    AddressHi,
    AddressLo,
    FunctionHi,
    FunctionLo,
    DataHi,
    DataLo,
    LrcHi,
    LrcLo,
    Cr,
    Lf,
    End,
}

/// Pull-based ASCII frame encoder.
///
/// Emits ':' followed by upper-case hex pairs for address, function code and
/// data, then the LRC pair, CR and the configured line feed.
#[derive(Debug)]
pub struct AsciiEncoder<'a> {
    state: EncoderState,
    frame: &'a Frame,
    index: usize,
    current: u8,
    lrc: Lrc,
    lrc_value: u8,
    line_feed: u8,
}

impl<'a> AsciiEncoder<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self::with_line_feed(frame, DEFAULT_LF)
    }

    /// Creates an encoder emitting a non-standard trailer character.
    pub fn with_line_feed(frame: &'a Frame, line_feed: u8) -> Self {
        Self {
            state: EncoderState::Start,
            frame,
            index: 0,
            current: 0,
            lrc: Lrc::new(),
            lrc_value: 0,
            line_feed,
        }
    }

    /// True while there are characters left to transmit.
    pub fn has_next(&self) -> bool {
        self.state != EncoderState::End
    }

    /// Produces the next character to be transmitted.
    pub fn next(&mut self) -> Result<u8, EncodeError> {
        let ch = match self.state {
            EncoderState::Start => {
                self.state = EncoderState::AddressHi;
                START
            }
            EncoderState::AddressHi => {
                self.current = self.frame.address;
                self.lrc.update(self.current);
                self.state = EncoderState::AddressLo;
                HEX_CHARS[(self.current >> 4) as usize]
            }
            EncoderState::AddressLo => {
                self.state = EncoderState::FunctionHi;
                HEX_CHARS[(self.current & 0x0F) as usize]
            }
            EncoderState::FunctionHi => {
                self.current = self.frame.function;
                self.lrc.update(self.current);
                self.state = EncoderState::FunctionLo;
                HEX_CHARS[(self.current >> 4) as usize]
            }
            EncoderState::FunctionLo => {
                self.state = if self.frame.data.is_empty() {
                    EncoderState::LrcHi
                } else {
                    EncoderState::DataHi
                };
                HEX_CHARS[(self.current & 0x0F) as usize]
            }
            EncoderState::DataHi => {
                self.current = self.frame.data[self.index];
                self.lrc.update(self.current);
                self.state = EncoderState::DataLo;
                HEX_CHARS[(self.current >> 4) as usize]
            }
            EncoderState::DataLo => {
                self.index += 1;
                self.state = if self.index >= self.frame.data.len() {
                    EncoderState::LrcHi
                } else {
                    EncoderState::DataHi
                };
                HEX_CHARS[(self.current & 0x0F) as usize]
            }
            EncoderState::LrcHi => {
                self.lrc_value = self.lrc.finalize();
                self.state = EncoderState::LrcLo;
                HEX_CHARS[(self.lrc_value >> 4) as usize]
            }
            EncoderState::LrcLo => {
                self.state = EncoderState::Cr;
                HEX_CHARS[(self.lrc_value & 0x0F) as usize]
            }
            EncoderState::Cr => {
                self.state = EncoderState::Lf;
                CR
            }
            EncoderState::Lf => {
                self.state = EncoderState::End;
                self.line_feed
            }
            EncoderState::End => return Err(EncodeError::FrameEnd),
        };
        Ok(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn encode(frame: &Frame) -> Vec<u8> {
        let mut encoder = AsciiEncoder::new(frame);
        let mut out = Vec::new();
        while encoder.has_next() {
            out.push(encoder.next().unwrap());
        }
        out
    }

    fn decode(chars: &[u8], capacity: usize) -> ReceivedFrame {
        let mut decoder = AsciiDecoder::new(capacity);
        for &ch in chars {
            decoder.update(ch);
        }
        assert!(decoder.is_complete());
        decoder.to_frame().unwrap()
    }

    #[test]
    fn test_encoder_known_frame() {
        // Read coils 0..=9 from unit 1; LRC = -(01+01+00+00+00+0A) = 0xF4.
        let frame = Frame::new(0x01, 0x01, vec![0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(encode(&frame), b":01010000000AF4\r\n");
    }

    #[test]
    fn test_encoder_response_frame() {
        // Coil read response 01 01 02 CD 01; LRC = 0x2E.
        let frame = Frame::new(0x01, 0x01, vec![0x02, 0xCD, 0x01]);
        assert_eq!(encode(&frame), b":010102CD012E\r\n");
    }

    #[test]
    fn test_encoder_configurable_line_feed() {
        let frame = Frame::new(0x01, 0x01, vec![0x02, 0xCD, 0x01]);
        let mut encoder = AsciiEncoder::with_line_feed(&frame, b'*');
        let mut out = Vec::new();
        while encoder.has_next() {
            out.push(encoder.next().unwrap());
        }
        assert_eq!(out, b":010102CD012E\r*");
    }

    #[test]
    fn test_encoder_next_after_end() {
        let frame = Frame::new(0x01, 0x07, vec![]);
        let mut encoder = AsciiEncoder::new(&frame);
        while encoder.has_next() {
            encoder.next().unwrap();
        }
        assert_eq!(encoder.next(), Err(EncodeError::FrameEnd));
    }

    #[test]
    fn test_decoder_known_frame() {
        let received = decode(b":01010000000AF4\r\n", 252);
        assert_eq!(received.flags, FrameFlags::empty());
        assert_eq!(received.frame.address, 0x01);
        assert_eq!(received.frame.function, 0x01);
        assert_eq!(received.frame.data, [0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_decoder_lower_case_hex() {
        let received = decode(b":010102cd012e\r\n", 252);
        assert_eq!(received.flags, FrameFlags::empty());
        assert_eq!(received.frame.data, [0x02, 0xCD, 0x01]);
    }

    #[test]
    fn test_decoder_discards_leading_garbage() {
        let received = decode(b"noise\x80\xFF:01010000000AF4\r\n", 252);
        assert_eq!(received.flags, FrameFlags::empty());
        assert_eq!(received.frame.address, 0x01);
    }

    #[test]
    fn test_decoder_resyncs_on_colon() {
        // A second ':' mid-frame restarts decoding.
        let received = decode(b":0101AB:01010000000AF4\r\n", 252);
        assert_eq!(received.flags, FrameFlags::empty());
        assert_eq!(received.frame.data, [0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_decoder_invalid_hex() {
        // Scenario: 'X' characters inside the hex region.
        let mut decoder = AsciiDecoder::new(252);
        for &ch in b":0101XX00000AF4\r\n" {
            decoder.update(ch);
        }
        assert!(decoder.is_complete());
        let received = decoder.to_frame().unwrap();
        assert!(received.flags.contains(FrameFlags::INVALID_BYTE));
        assert!(!received.is_deliverable());
    }

    #[test]
    fn test_decoder_bad_lrc() {
        let received = decode(b":01010000000AFF\r\n", 252);
        assert!(received.flags.contains(FrameFlags::CHECKSUM_MISMATCH));
    }

    #[test]
    fn test_decoder_lone_line_feed_accepted() {
        let received = decode(b":01010000000AF4\n", 252);
        assert_eq!(received.flags, FrameFlags::empty());
        assert_eq!(received.frame.data, [0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_decoder_truncated_no_trailer() {
        // Address and function only, no LRC pair.
        let received = decode(b":0101\r\n", 252);
        assert!(received.flags.contains(FrameFlags::TRUNCATED));
    }

    #[test]
    fn test_decoder_empty_frame() {
        let received = decode(b":\r\n", 252);
        assert!(received.flags.contains(FrameFlags::TRUNCATED));
    }

    #[test]
    fn test_decoder_redundant_byte_after_end() {
        let mut decoder = AsciiDecoder::new(252);
        for &ch in b":01010000000AF4\r\n" {
            decoder.update(ch);
        }
        decoder.update(b'Z');
        let received = decoder.to_frame().unwrap();
        assert!(received.flags.contains(FrameFlags::REDUNDANT_BYTE));
        assert!(received.is_deliverable());
    }

    #[test]
    fn test_decoder_overflow() {
        let frame = Frame::new(0x01, 0x10, vec![0x55; 16]);
        let chars = encode(&frame);
        let mut decoder = AsciiDecoder::new(8);
        for &ch in &chars {
            decoder.update(ch);
        }
        let received = decoder.to_frame().unwrap();
        assert!(received.flags.contains(FrameFlags::BUFFER_OVERFLOW));
        assert!(!received.flags.contains(FrameFlags::CHECKSUM_MISMATCH));
        assert!(received.frame.data.len() <= 8);
    }

    #[test]
    fn test_round_trip_random_frames() {
        let mut rng = SmallRng::seed_from_u64(0xA5C11);
        for line_feed in [DEFAULT_LF, CR, b'*'] {
            for _ in 0..100 {
                let len = rng.gen_range(0..=252);
                let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                let frame = Frame::new(rng.gen_range(1..=247), rng.gen_range(1..=127), data);

                let mut encoder = AsciiEncoder::with_line_feed(&frame, line_feed);
                let mut chars = Vec::new();
                while encoder.has_next() {
                    chars.push(encoder.next().unwrap());
                }

                let mut decoder = AsciiDecoder::with_line_feed(252, line_feed);
                for &ch in &chars {
                    decoder.update(ch);
                }
                assert!(decoder.is_complete());
                let received = decoder.to_frame().unwrap();
                assert_eq!(received.flags, FrameFlags::empty());
                assert_eq!(received.frame, frame);
            }
        }
    }

    #[test]
    fn test_external_end_marks_truncated() {
        let mut decoder = AsciiDecoder::new(252);
        for &ch in b":0101000" {
            decoder.update(ch);
        }
        decoder.end().unwrap();
        let received = decoder.to_frame().unwrap();
        assert!(received.flags.contains(FrameFlags::TRUNCATED));
    }
}

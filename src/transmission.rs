//! Mode-aware transmission core.
//!
//! Binds a serial driver to one frame decoder and one frame encoder,
//! owns the half-duplex line state, enforces the RTU inter-frame timing
//! gates, and surfaces per-frame status to the role pipelines.
//!
//! Driver-side contexts enter through the [`DriverSink`] impl; those entry
//! points are bounded, never block and communicate with pipeline tasks only
//! through the flag group and the mutex-guarded interface state.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::codec::ascii::{AsciiDecoder, AsciiEncoder, DEFAULT_LF};
use crate::codec::rtu::{RtuDecoder, RtuEncoder};
use crate::codec::TransmissionMode;
use crate::config::SerialConfig;
use crate::driver::{DriverCallbacks, DriverSink, DuplexMode, SerialDriver};
use crate::errors::{DeviceError, OsError, StackError};
use crate::frame::{Frame, ReceivedFrame, MAX_PDU_DATA_SIZE};
use crate::os::FlagGroup;

/// Half-character ticks of line silence after which the line counts as
/// idle and transmission is allowed.
const ALLOW_SEND_TICKS: u32 = 3;

/// Half-character ticks of line silence that delimit an RTU frame
/// (3.5 character times per the Modbus spec).
const FRAME_END_TICKS: u32 = 7;

/// Flag bits posted by the core towards pipeline tasks.
const FLAG_FRAME_READY: u32 = 1 << 0;
const FLAG_TX_COMPLETE: u32 = 1 << 1;
const FLAG_LINE_IDLE: u32 = 1 << 2;

/// Direction state of the half-duplex interface; the single source of
/// truth for who owns the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Idle,
    Receiving,
    Transmitting,
}

/// The per-mode streaming decoder.
#[derive(Debug)]
enum Decoder {
    Rtu(RtuDecoder),
    Ascii(AsciiDecoder),
}

impl Decoder {
    fn update(&mut self, byte: u8) {
        match self {
            Decoder::Rtu(dec) => dec.update(byte),
            Decoder::Ascii(dec) => dec.update(byte),
        }
    }

    fn add_flags(&mut self, flags: crate::frame::FrameFlags) {
        match self {
            Decoder::Rtu(dec) => dec.add_flags(flags),
            Decoder::Ascii(dec) => dec.add_flags(flags),
        }
    }

    /// True once the decoder has consumed its own end-of-frame delimiter
    /// (ASCII only; RTU frames end by timing).
    fn is_complete(&self) -> bool {
        match self {
            Decoder::Rtu(_) => false,
            Decoder::Ascii(dec) => dec.is_complete(),
        }
    }

    fn finish(&mut self) -> Option<ReceivedFrame> {
        let received = match self {
            Decoder::Rtu(dec) => {
                dec.end().ok()?;
                dec.to_frame().ok()
            }
            Decoder::Ascii(dec) => {
                if !dec.is_complete() {
                    dec.end().ok()?;
                }
                dec.to_frame().ok()
            }
        };
        self.reset();
        received
    }

    fn reset(&mut self) {
        match self {
            Decoder::Rtu(dec) => dec.reset(),
            Decoder::Ascii(dec) => dec.reset(),
        }
    }
}

struct Inner {
    driver: Box<dyn SerialDriver>,
    decoder: Decoder,
    state: LineState,
    opened: bool,
    listen_only: bool,
    pending: Option<ReceivedFrame>,
    half_char_count: u32,
    line_idle: bool,
}

/// The transmission core for one serial interface.
///
/// Created behind an [`Arc`] so the driver can signal it weakly; exactly
/// one role pipeline (slave or master) drives each core.
pub struct Transmission {
    mode: TransmissionMode,
    config: SerialConfig,
    ascii_line_feed: u8,
    inner: Mutex<Inner>,
    signals: FlagGroup,
}

impl Transmission {
    /// Creates a core over the given driver and framing mode.
    pub fn new(
        driver: Box<dyn SerialDriver>,
        mode: TransmissionMode,
        config: SerialConfig,
    ) -> Result<Arc<Self>, StackError> {
        Self::build(driver, mode, config, DEFAULT_LF)
    }

    /// Creates an ASCII core with a non-standard line-feed character.
    pub fn with_ascii_line_feed(
        driver: Box<dyn SerialDriver>,
        config: SerialConfig,
        line_feed: u8,
    ) -> Result<Arc<Self>, StackError> {
        Self::build(driver, TransmissionMode::Ascii, config, line_feed)
    }

    fn build(
        driver: Box<dyn SerialDriver>,
        mode: TransmissionMode,
        config: SerialConfig,
        line_feed: u8,
    ) -> Result<Arc<Self>, StackError> {
        config.validate(mode)?;

        let decoder = match mode {
            TransmissionMode::Rtu => Decoder::Rtu(RtuDecoder::new(MAX_PDU_DATA_SIZE)),
            TransmissionMode::Ascii => {
                Decoder::Ascii(AsciiDecoder::with_line_feed(MAX_PDU_DATA_SIZE, line_feed))
            }
        };

        let core = Arc::new(Self {
            mode,
            config,
            ascii_line_feed: line_feed,
            inner: Mutex::new(Inner {
                driver,
                decoder,
                state: LineState::Idle,
                opened: false,
                listen_only: false,
                pending: None,
                half_char_count: 0,
                line_idle: true,
            }),
            signals: FlagGroup::new(),
        });

        let core_dyn: Arc<dyn DriverSink> = core.clone();
        let sink: Weak<dyn DriverSink> = Arc::downgrade(&core_dyn);
        core.lock().driver.initialize(DriverCallbacks::new(sink))?;

        Ok(core)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("transmission core poisoned")
    }

    pub fn mode(&self) -> TransmissionMode {
        self.mode
    }

    pub fn serial_config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.lock().opened
    }

    /// Opens the serial device and arms the receive path.
    pub fn open(&self) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        if inner.opened {
            return Err(DeviceError::AlreadyOpened);
        }
        inner.driver.open(&self.config)?;
        inner.driver.set_duplex(DuplexMode::Receive)?;
        inner.driver.rx_start()?;
        inner.opened = true;
        inner.state = LineState::Idle;
        inner.line_idle = true;
        inner.half_char_count = 0;
        inner.decoder.reset();
        inner.pending = None;
        debug!(mode = %self.mode, port = %self.config.serial_port_info(), "interface opened");
        Ok(())
    }

    /// Closes the serial device; stops RX/TX and cancels the timer.
    /// Pipeline waits in flight observe the closure on their next attempt.
    pub fn close(&self) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        if !inner.opened {
            return Err(DeviceError::NotOpened);
        }
        let _ = inner.driver.rx_stop();
        let _ = inner.driver.tx_stop();
        if self.mode == TransmissionMode::Rtu {
            let _ = inner.driver.half_char_timer_stop();
        }
        inner.driver.close()?;
        inner.opened = false;
        inner.state = LineState::Idle;
        inner.pending = None;
        inner.decoder.reset();
        debug!(mode = %self.mode, "interface closed");
        Ok(())
    }

    /// Switches listen-only mode. Returns `true` when the flag actually
    /// changed. Rejected while a transmission owns the line; the switch is
    /// synchronous with the idle state.
    pub fn set_listen_only(&self, enabled: bool) -> Result<bool, DeviceError> {
        let mut inner = self.lock();
        if inner.state == LineState::Transmitting {
            return Err(DeviceError::Busy);
        }
        let changed = inner.listen_only != enabled;
        inner.listen_only = enabled;
        if changed {
            debug!(enabled, "listen-only mode switched");
        }
        Ok(changed)
    }

    pub fn is_listen_only(&self) -> bool {
        self.lock().listen_only
    }

    /// Waits for the next decoded frame. `Ok(None)` on timeout.
    pub async fn wait_frame(
        &self,
        timeout: Duration,
    ) -> Result<Option<ReceivedFrame>, DeviceError> {
        if !self.lock().opened {
            return Err(DeviceError::NotOpened);
        }
        match self.signals.pend_any(FLAG_FRAME_READY, timeout).await {
            Ok(_) => {
                let mut inner = self.lock();
                if !inner.opened {
                    return Err(DeviceError::NotOpened);
                }
                Ok(inner.pending.take())
            }
            Err(OsError::PendTimeout(_)) | Err(OsError::Disposed) => Ok(None),
        }
    }

    /// Drops a partially received frame, re-arming the decoder. Used by the
    /// master when a transaction times out mid-receive.
    pub fn drop_partial_receive(&self) {
        let mut inner = self.lock();
        inner.decoder.reset();
        inner.pending = None;
        if inner.state == LineState::Receiving {
            inner.state = LineState::Idle;
        }
        self.signals.clear(FLAG_FRAME_READY);
    }

    /// Worst-case time for the frame to clear the line, with margin.
    fn tx_timeout(&self, frame: &Frame) -> Duration {
        let chars = match self.mode {
            TransmissionMode::Rtu => frame.data.len() + 4,
            TransmissionMode::Ascii => 2 * frame.data.len() + 11,
        };
        self.config.character_time() * (chars as u32 + 8) + Duration::from_millis(250)
    }

    /// Hands a frame to the line: switches half-duplex to transmit, pumps
    /// the encoder into the driver, waits for the transmit path to drain,
    /// then turns the line around and re-arms the decoder.
    ///
    /// Returns `false` when transmission was suppressed by listen-only
    /// mode; the frame never touches the line in that case.
    pub async fn transmit(&self, frame: &Frame) -> Result<bool, StackError> {
        // RTU gate: wait out the allow-send window after line activity.
        if self.mode == TransmissionMode::Rtu {
            loop {
                {
                    let inner = self.lock();
                    if !inner.opened {
                        return Err(DeviceError::NotOpened.into());
                    }
                    if inner.line_idle && inner.state != LineState::Transmitting {
                        break;
                    }
                }
                let gate = self.config.half_character_time() * (FRAME_END_TICKS * 4)
                    + Duration::from_millis(100);
                self.signals
                    .pend_any(FLAG_LINE_IDLE, gate)
                    .await
                    .map_err(|_| DeviceError::Busy)?;
            }
        }

        {
            let mut inner = self.lock();
            if !inner.opened {
                return Err(DeviceError::NotOpened.into());
            }
            if inner.listen_only {
                trace!("transmission suppressed: listen-only");
                return Ok(false);
            }
            if inner.state == LineState::Transmitting {
                return Err(DeviceError::Busy.into());
            }

            inner.state = LineState::Transmitting;
            self.signals.clear(FLAG_TX_COMPLETE);

            let started = (|| -> Result<(), StackError> {
                inner.driver.rx_stop()?;
                inner.driver.set_duplex(DuplexMode::Transmit)?;
                inner.driver.tx_start()?;
                match self.mode {
                    TransmissionMode::Rtu => {
                        let mut encoder = RtuEncoder::new(frame);
                        while encoder.has_next() {
                            let byte = encoder.next()?;
                            inner.driver.tx_transmit(byte)?;
                        }
                    }
                    TransmissionMode::Ascii => {
                        let mut encoder =
                            AsciiEncoder::with_line_feed(frame, self.ascii_line_feed);
                        while encoder.has_next() {
                            let byte = encoder.next()?;
                            inner.driver.tx_transmit(byte)?;
                        }
                    }
                }
                Ok(())
            })();

            if let Err(err) = started {
                let _ = inner.driver.tx_stop();
                let _ = inner.driver.set_duplex(DuplexMode::Receive);
                let _ = inner.driver.rx_start();
                inner.state = LineState::Idle;
                return Err(err);
            }

            trace!(
                address = frame.address,
                function = %format_args!("{:#04x}", frame.function),
                data = %hex::encode(&frame.data),
                "frame handed to line"
            );
        }

        // Wait for the last byte to physically clear the shift register.
        let drained = self
            .signals
            .pend_any(FLAG_TX_COMPLETE, self.tx_timeout(frame))
            .await;

        let mut inner = self.lock();
        let _ = inner.driver.tx_stop();
        let _ = inner.driver.set_duplex(DuplexMode::Receive);
        let _ = inner.driver.rx_start();
        inner.decoder.reset();
        inner.state = LineState::Idle;
        inner.line_idle = true;
        inner.half_char_count = 0;

        match drained {
            Ok(_) => Ok(true),
            Err(_) => Err(DeviceError::fail("transmit path did not drain").into()),
        }
    }

    /// Takes the completed frame out of the decoder and parks it for the
    /// pipeline.
    fn publish_frame(&self, inner: &mut Inner) {
        if let Some(received) = inner.decoder.finish() {
            trace!(
                address = received.frame.address,
                function = %format_args!("{:#04x}", received.frame.function),
                flags = ?received.flags,
                data = %hex::encode(&received.frame.data),
                "frame received"
            );
            if inner.pending.is_some() {
                warn!("previous frame not yet consumed, replacing");
            }
            inner.pending = Some(received);
            inner.state = LineState::Idle;
            self.signals.post(FLAG_FRAME_READY);
        } else {
            inner.state = LineState::Idle;
        }
    }
}

impl DriverSink for Transmission {
    fn rx_ready(&self) {
        let mut inner = self.lock();
        if !inner.opened {
            return;
        }
        if inner.state == LineState::Transmitting {
            // Half-duplex: discard echoes while we own the line.
            while let Ok(Some(_)) = inner.driver.rx_read() {}
            return;
        }
        loop {
            let byte = match inner.driver.rx_read() {
                Ok(Some(byte)) => byte,
                Ok(None) => break,
                Err(_) => break,
            };
            if inner.state == LineState::Idle {
                inner.state = LineState::Receiving;
            }

            // Per-frame mirroring of the UART error latches.
            let errors = inner.driver.line_errors();
            if !errors.is_empty() {
                inner.decoder.add_flags(errors.to_frame_flags());
                inner.driver.clear_line_errors(errors);
            }

            inner.decoder.update(byte);

            match self.mode {
                TransmissionMode::Rtu => {
                    inner.half_char_count = 0;
                    inner.line_idle = false;
                    let period = self.config.half_character_time();
                    let _ = inner.driver.half_char_timer_start(period);
                }
                TransmissionMode::Ascii => {
                    if inner.decoder.is_complete() {
                        self.publish_frame(&mut inner);
                    }
                }
            }
        }
    }

    fn tx_complete(&self) {
        self.signals.post(FLAG_TX_COMPLETE);
    }

    fn half_char_tick(&self) {
        let mut inner = self.lock();
        if !inner.opened || self.mode != TransmissionMode::Rtu {
            return;
        }
        if inner.state != LineState::Receiving {
            return;
        }
        inner.half_char_count += 1;
        if inner.half_char_count == ALLOW_SEND_TICKS {
            inner.line_idle = true;
            self.signals.post(FLAG_LINE_IDLE);
        }
        if inner.half_char_count >= FRAME_END_TICKS {
            let _ = inner.driver.half_char_timer_stop();
            self.publish_frame(&mut inner);
        }
    }
}

impl std::fmt::Debug for Transmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmission")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

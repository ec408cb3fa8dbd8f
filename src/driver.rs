//! Serial device driver abstraction.
//!
//! The transmission core consumes a serial device through the
//! [`SerialDriver`] capability trait and hands the driver a
//! [`DriverCallbacks`] handle at initialization. Driver-side contexts
//! (reader threads, timer threads, interrupt shims) signal the core through
//! that handle; the entry points are bounded and never block, so they are
//! safe to call from interrupt-like contexts.

use std::sync::Weak;
use std::time::Duration;

use bitflags::bitflags;

use crate::config::SerialConfig;
use crate::errors::DeviceError;
use crate::frame::FrameFlags;

/// Direction of the half-duplex line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplexMode {
    Receive,
    Transmit,
}

bitflags! {
    /// Per-character error conditions latched by the UART.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineErrors: u8 {
        const PARITY = 1 << 0;
        const OVERRUN = 1 << 1;
        const FRAME = 1 << 2;
    }
}

impl LineErrors {
    /// Mirrors the latched conditions into the frame-flag bit set.
    pub fn to_frame_flags(self) -> FrameFlags {
        let mut flags = FrameFlags::empty();
        if self.contains(LineErrors::PARITY) {
            flags |= FrameFlags::PARITY_ERROR;
        }
        if self.contains(LineErrors::OVERRUN) {
            flags |= FrameFlags::OVERRUN_ERROR;
        }
        if self.contains(LineErrors::FRAME) {
            flags |= FrameFlags::FRAME_ERROR;
        }
        flags
    }
}

/// Signals the transmission core consumes from the driver.
///
/// Implemented by the core; drivers never call it directly but go through
/// [`DriverCallbacks`].
pub trait DriverSink: Send + Sync {
    /// One or more received bytes are waiting in the driver.
    fn rx_ready(&self);

    /// The transmit path has drained; the last handed byte has physically
    /// cleared the shift register.
    fn tx_complete(&self);

    /// The half-character timer expired (RTU only).
    fn half_char_tick(&self);
}

/// Callback handle given to the driver at initialization.
///
/// Holds the core weakly so a driver thread that outlives the stack cannot
/// keep it alive; signals after teardown are dropped.
#[derive(Clone)]
pub struct DriverCallbacks {
    sink: Weak<dyn DriverSink>,
}

impl DriverCallbacks {
    pub fn new(sink: Weak<dyn DriverSink>) -> Self {
        Self { sink }
    }

    pub fn rx_ready(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.rx_ready();
        }
    }

    pub fn tx_complete(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.tx_complete();
        }
    }

    pub fn half_char_tick(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.half_char_tick();
        }
    }
}

impl std::fmt::Debug for DriverCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCallbacks").finish_non_exhaustive()
    }
}

/// Capability set of a serial device.
///
/// All methods are called with the core's interface lock held and must not
/// block or call back into the core synchronously; completion is signalled
/// through [`DriverCallbacks`] from driver-side contexts.
pub trait SerialDriver: Send {
    /// Registers the core's callback handle. Called once before `open`.
    fn initialize(&mut self, callbacks: DriverCallbacks) -> Result<(), DeviceError>;

    /// Opens the device with the given serial line setup.
    fn open(&mut self, setup: &SerialConfig) -> Result<(), DeviceError>;

    /// Closes the device, stopping RX, TX and the half-character timer.
    fn close(&mut self) -> Result<(), DeviceError>;

    fn rx_start(&mut self) -> Result<(), DeviceError>;

    fn rx_stop(&mut self) -> Result<(), DeviceError>;

    /// Pops one received byte, `None` when the receive queue is drained.
    fn rx_read(&mut self) -> Result<Option<u8>, DeviceError>;

    fn tx_start(&mut self) -> Result<(), DeviceError>;

    fn tx_stop(&mut self) -> Result<(), DeviceError>;

    /// Hands one byte to the transmit path. The driver may buffer; it
    /// signals `tx_complete` once everything handed so far has cleared the
    /// line.
    fn tx_transmit(&mut self, byte: u8) -> Result<(), DeviceError>;

    /// Switches the half-duplex line direction.
    fn set_duplex(&mut self, mode: DuplexMode) -> Result<(), DeviceError>;

    /// Starts (or restarts) the half-character timer with the given period.
    /// RTU only; expiry signals `half_char_tick` repeatedly.
    fn half_char_timer_start(&mut self, period: Duration) -> Result<(), DeviceError>;

    fn half_char_timer_stop(&mut self) -> Result<(), DeviceError>;

    /// Error conditions latched since the last clear.
    fn line_errors(&mut self) -> LineErrors;

    /// Clears the given latched error conditions.
    fn clear_line_errors(&mut self, which: LineErrors);
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable in-memory driver for pipeline and core tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{DriverCallbacks, DuplexMode, LineErrors, SerialDriver};
    use crate::config::SerialConfig;
    use crate::errors::DeviceError;

    #[derive(Debug, Default)]
    pub struct MockState {
        pub opened: bool,
        pub rx_running: bool,
        pub tx_running: bool,
        pub rx_queue: VecDeque<u8>,
        pub tx_bytes: Vec<u8>,
        pub duplex: Option<DuplexMode>,
        pub line_errors: LineErrors,
        pub timer_running: bool,
        pub timer_period: Option<Duration>,
        pub open_count: u32,
        pub close_count: u32,
    }

    /// Mock serial driver. `tx_transmit` records the byte and immediately
    /// signals `tx_complete`, so a transmit pump completes as soon as the
    /// last byte is handed over.
    pub struct MockDriver {
        state: Arc<Mutex<MockState>>,
        callbacks: Option<DriverCallbacks>,
    }

    impl MockDriver {
        pub fn new() -> (Self, Arc<Mutex<MockState>>) {
            let state = Arc::new(Mutex::new(MockState::default()));
            (
                Self {
                    state: state.clone(),
                    callbacks: None,
                },
                state,
            )
        }
    }

    impl SerialDriver for MockDriver {
        fn initialize(&mut self, callbacks: DriverCallbacks) -> Result<(), DeviceError> {
            self.callbacks = Some(callbacks);
            Ok(())
        }

        fn open(&mut self, _setup: &SerialConfig) -> Result<(), DeviceError> {
            let mut state = self.state.lock().unwrap();
            if state.opened {
                return Err(DeviceError::AlreadyOpened);
            }
            state.opened = true;
            state.open_count += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), DeviceError> {
            let mut state = self.state.lock().unwrap();
            if !state.opened {
                return Err(DeviceError::NotOpened);
            }
            state.opened = false;
            state.rx_running = false;
            state.tx_running = false;
            state.timer_running = false;
            state.close_count += 1;
            Ok(())
        }

        fn rx_start(&mut self) -> Result<(), DeviceError> {
            self.state.lock().unwrap().rx_running = true;
            Ok(())
        }

        fn rx_stop(&mut self) -> Result<(), DeviceError> {
            self.state.lock().unwrap().rx_running = false;
            Ok(())
        }

        fn rx_read(&mut self) -> Result<Option<u8>, DeviceError> {
            Ok(self.state.lock().unwrap().rx_queue.pop_front())
        }

        fn tx_start(&mut self) -> Result<(), DeviceError> {
            self.state.lock().unwrap().tx_running = true;
            Ok(())
        }

        fn tx_stop(&mut self) -> Result<(), DeviceError> {
            self.state.lock().unwrap().tx_running = false;
            Ok(())
        }

        fn tx_transmit(&mut self, byte: u8) -> Result<(), DeviceError> {
            self.state.lock().unwrap().tx_bytes.push(byte);
            if let Some(callbacks) = &self.callbacks {
                callbacks.tx_complete();
            }
            Ok(())
        }

        fn set_duplex(&mut self, mode: DuplexMode) -> Result<(), DeviceError> {
            self.state.lock().unwrap().duplex = Some(mode);
            Ok(())
        }

        fn half_char_timer_start(&mut self, period: Duration) -> Result<(), DeviceError> {
            let mut state = self.state.lock().unwrap();
            state.timer_running = true;
            state.timer_period = Some(period);
            Ok(())
        }

        fn half_char_timer_stop(&mut self) -> Result<(), DeviceError> {
            self.state.lock().unwrap().timer_running = false;
            Ok(())
        }

        fn line_errors(&mut self) -> LineErrors {
            self.state.lock().unwrap().line_errors
        }

        fn clear_line_errors(&mut self, which: LineErrors) {
            let mut state = self.state.lock().unwrap();
            let remaining = state.line_errors - which;
            state.line_errors = remaining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_errors_to_frame_flags() {
        assert_eq!(LineErrors::empty().to_frame_flags(), FrameFlags::empty());
        assert_eq!(
            LineErrors::PARITY.to_frame_flags(),
            FrameFlags::PARITY_ERROR
        );
        assert_eq!(
            (LineErrors::OVERRUN | LineErrors::FRAME).to_frame_flags(),
            FrameFlags::OVERRUN_ERROR | FrameFlags::FRAME_ERROR
        );
    }

    #[test]
    fn test_callbacks_after_core_drop_are_ignored() {
        struct NullSink;
        impl DriverSink for NullSink {
            fn rx_ready(&self) {}
            fn tx_complete(&self) {}
            fn half_char_tick(&self) {}
        }

        let sink: std::sync::Arc<dyn DriverSink> = std::sync::Arc::new(NullSink);
        let callbacks = DriverCallbacks::new(std::sync::Arc::downgrade(&sink));
        drop(sink);
        // Must not panic once the core is gone.
        callbacks.rx_ready();
        callbacks.tx_complete();
        callbacks.half_char_tick();
    }
}

//! Production [`SerialDriver`] backed by the `serialport` crate.
//!
//! A reader thread polls the port and queues received bytes for the core; a
//! timer thread provides the RTU half-character ticks. Both threads signal
//! the core through [`DriverCallbacks`] and die with the device.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, warn};

use crate::config::SerialConfig;
use crate::driver::{DriverCallbacks, DuplexMode, LineErrors, SerialDriver};
use crate::errors::DeviceError;

/// Poll timeout of the reader thread; bounds shutdown latency.
const READ_POLL: Duration = Duration::from_millis(10);

/// Timer thread park time while the half-character timer is stopped.
const TIMER_PARKED: Duration = Duration::from_secs(3600);

enum TimerCommand {
    /// (Re)start with the given period; each command restarts the interval.
    Start(Duration),
    Stop,
    Shutdown,
}

/// Serial device driver over a `serialport` port handle.
///
/// The host UART does not surface per-character parity/framing latches
/// through the `serialport` API, so [`SerialDriver::line_errors`] stays
/// empty on this driver. Direction switching is optionally mapped onto the
/// RTS line for RS-485 transceivers.
pub struct SerialPortDriver {
    callbacks: Option<DriverCallbacks>,
    port: Option<Box<dyn SerialPort>>,
    rx_queue: Arc<Mutex<VecDeque<u8>>>,
    rx_enabled: Arc<AtomicBool>,
    reader_running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    timer_tx: Option<mpsc::Sender<TimerCommand>>,
    timer: Option<JoinHandle<()>>,
    rts_direction: bool,
}

impl SerialPortDriver {
    pub fn new() -> Self {
        Self {
            callbacks: None,
            port: None,
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            rx_enabled: Arc::new(AtomicBool::new(false)),
            reader_running: Arc::new(AtomicBool::new(false)),
            reader: None,
            timer_tx: None,
            timer: None,
            rts_direction: false,
        }
    }

    /// Drives the RTS line on half-duplex direction switches, for RS-485
    /// transceivers keyed by RTS.
    pub fn with_rts_direction() -> Self {
        Self {
            callbacks: None,
            port: None,
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            rx_enabled: Arc::new(AtomicBool::new(false)),
            reader_running: Arc::new(AtomicBool::new(false)),
            reader: None,
            timer_tx: None,
            timer: None,
            rts_direction: true,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, DeviceError> {
        self.port.as_mut().ok_or(DeviceError::NotOpened)
    }

    fn spawn_reader(&mut self, port: Box<dyn SerialPort>) {
        let queue = self.rx_queue.clone();
        let enabled = self.rx_enabled.clone();
        let running = self.reader_running.clone();
        let callbacks = self.callbacks.clone();

        running.store(true, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("modbus-serial-rx".into())
            .spawn(move || {
                let mut port = port;
                let mut buf = [0u8; 256];
                while running.load(Ordering::SeqCst) {
                    match port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => {
                            if !enabled.load(Ordering::SeqCst) {
                                // Half-duplex echo while transmitting.
                                continue;
                            }
                            queue.lock().unwrap().extend(buf[..n].iter().copied());
                            if let Some(callbacks) = &callbacks {
                                callbacks.rx_ready();
                            }
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(err) => {
                            warn!("serial reader stopping: {err}");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn serial reader thread");
        self.reader = Some(handle);
    }

    fn spawn_timer(&mut self) {
        let (tx, rx) = mpsc::channel::<TimerCommand>();
        let callbacks = self.callbacks.clone();

        let handle = std::thread::Builder::new()
            .name("modbus-serial-timer".into())
            .spawn(move || {
                let mut armed = false;
                let mut period = TIMER_PARKED;
                loop {
                    let wait = if armed { period } else { TIMER_PARKED };
                    match rx.recv_timeout(wait) {
                        Ok(TimerCommand::Start(p)) => {
                            armed = true;
                            period = p;
                        }
                        Ok(TimerCommand::Stop) => armed = false,
                        Ok(TimerCommand::Shutdown) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            if armed {
                                if let Some(callbacks) = &callbacks {
                                    callbacks.half_char_tick();
                                }
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn serial timer thread");
        self.timer_tx = Some(tx);
        self.timer = Some(handle);
    }

    fn stop_threads(&mut self) {
        self.reader_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(tx) = self.timer_tx.take() {
            let _ = tx.send(TimerCommand::Shutdown);
        }
        if let Some(handle) = self.timer.take() {
            let _ = handle.join();
        }
    }
}

impl Default for SerialPortDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialPortDriver {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

impl SerialDriver for SerialPortDriver {
    fn initialize(&mut self, callbacks: DriverCallbacks) -> Result<(), DeviceError> {
        self.callbacks = Some(callbacks);
        Ok(())
    }

    fn open(&mut self, setup: &SerialConfig) -> Result<(), DeviceError> {
        if self.port.is_some() {
            return Err(DeviceError::AlreadyOpened);
        }
        let parity = setup.parity.as_serialport().ok_or(DeviceError::ModeMismatch)?;
        let stop_bits = setup
            .stop_bits
            .as_serialport()
            .ok_or(DeviceError::ModeMismatch)?;

        let port = serialport::new(setup.device.as_str(), setup.baud_rate)
            .data_bits(setup.data_bits.into())
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(READ_POLL)
            .open()?;

        let reader_port = port.try_clone()?;
        self.port = Some(port);
        self.rx_queue.lock().unwrap().clear();
        self.spawn_reader(reader_port);
        self.spawn_timer();
        debug!(port = %setup.serial_port_info(), "serial device opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.port.is_none() {
            return Err(DeviceError::NotOpened);
        }
        self.stop_threads();
        self.port = None;
        self.rx_enabled.store(false, Ordering::SeqCst);
        self.rx_queue.lock().unwrap().clear();
        debug!("serial device closed");
        Ok(())
    }

    fn rx_start(&mut self) -> Result<(), DeviceError> {
        if self.port.is_none() {
            return Err(DeviceError::NotOpened);
        }
        self.rx_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn rx_stop(&mut self) -> Result<(), DeviceError> {
        self.rx_enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rx_read(&mut self) -> Result<Option<u8>, DeviceError> {
        Ok(self.rx_queue.lock().unwrap().pop_front())
    }

    fn tx_start(&mut self) -> Result<(), DeviceError> {
        if self.port.is_none() {
            return Err(DeviceError::NotOpened);
        }
        Ok(())
    }

    fn tx_stop(&mut self) -> Result<(), DeviceError> {
        // Block until the OS transmit path has drained before the line is
        // turned around.
        if let Some(port) = self.port.as_mut() {
            let _ = port.flush();
        }
        Ok(())
    }

    fn tx_transmit(&mut self, byte: u8) -> Result<(), DeviceError> {
        let port = self.port_mut()?;
        std::io::Write::write_all(port, &[byte])?;
        if let Some(callbacks) = &self.callbacks {
            callbacks.tx_complete();
        }
        Ok(())
    }

    fn set_duplex(&mut self, mode: DuplexMode) -> Result<(), DeviceError> {
        if self.rts_direction {
            let port = self.port_mut()?;
            port.write_request_to_send(mode == DuplexMode::Transmit)?;
        }
        Ok(())
    }

    fn half_char_timer_start(&mut self, period: Duration) -> Result<(), DeviceError> {
        if let Some(tx) = &self.timer_tx {
            tx.send(TimerCommand::Start(period))
                .map_err(|_| DeviceError::fail("timer thread gone"))?;
            Ok(())
        } else {
            Err(DeviceError::NotOpened)
        }
    }

    fn half_char_timer_stop(&mut self) -> Result<(), DeviceError> {
        if let Some(tx) = &self.timer_tx {
            let _ = tx.send(TimerCommand::Stop);
        }
        Ok(())
    }

    fn line_errors(&mut self) -> LineErrors {
        // Not surfaced by the serialport API.
        LineErrors::empty()
    }

    fn clear_line_errors(&mut self, _which: LineErrors) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let mut driver = SerialPortDriver::new();
        let setup = SerialConfig {
            device: "/dev/does-not-exist-modbus".into(),
            ..SerialConfig::default()
        };
        assert!(driver.open(&setup).is_err());
    }

    #[test]
    fn test_calls_require_open_device() {
        let mut driver = SerialPortDriver::new();
        assert!(matches!(driver.rx_start(), Err(DeviceError::NotOpened)));
        assert!(matches!(driver.tx_transmit(0), Err(DeviceError::NotOpened)));
        assert!(matches!(driver.close(), Err(DeviceError::NotOpened)));
    }
}

//! Slave (responder) pipeline.
//!
//! An application task calls [`Slave::poll`] in a loop; one call processes
//! at most one received frame: counters, address match, command dispatch,
//! exception encoding and the reply hand-off to the transmission core.

pub mod cmdlet;
mod cmdtable;

pub use cmdtable::{CommandTable, CommandTableLayout, Entry};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::SlaveConfig;
use crate::errors::{SlaveError, StackError};
use crate::frame::{
    function, ExceptionCode, Frame, FrameFlags, EXCEPTION_BIT,
};
use crate::slave::cmdlet::{DataModel, Handler, Request, Response};
use crate::transmission::Transmission;

/// Diagnostic counters kept by the slave pipeline.
///
/// Written by the pipeline task only; readers observe them without locking
/// and tolerate a racy one-word read.
#[derive(Debug, Default)]
struct Counters {
    bus_message: AtomicU32,
    bus_comm_error: AtomicU32,
    slave_message: AtomicU32,
    slave_exception: AtomicU32,
    slave_no_response: AtomicU32,
}

/// Point-in-time copy of the slave counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Frames seen on the bus, including damaged ones.
    pub bus_message: u32,
    /// Frames discarded for communication errors.
    pub bus_comm_error: u32,
    /// Frames addressed to this slave (or broadcast).
    pub slave_message: u32,
    /// Exception responses produced.
    pub slave_exception: u32,
    /// Requests processed without a reply (broadcast, listen-only).
    pub slave_no_response: u32,
}

/// The slave pipeline over one transmission core.
pub struct Slave {
    core: Arc<Transmission>,
    config: SlaveConfig,
    table: CommandTable,
    counters: Counters,
    response_buf: Vec<u8>,
}

impl Slave {
    pub fn new(core: Arc<Transmission>, config: SlaveConfig) -> Result<Self, StackError> {
        config.validate()?;
        let table = CommandTable::new(config.command_table);
        let response_buf = vec![0u8; config.buffer_capacity];
        Ok(Self {
            core,
            config,
            table,
            counters: Counters::default(),
            response_buf,
        })
    }

    pub fn unit_address(&self) -> u8 {
        self.config.unit_address
    }

    /// Registers a command handler. Permitted during initialization only;
    /// the table is read-only once polling starts.
    pub fn register(
        &mut self,
        function: u8,
        handler: Handler,
        no_broadcast: bool,
        no_listen_only: bool,
    ) -> Result<(), SlaveError> {
        self.table.add(function, handler, no_broadcast, no_listen_only)
    }

    /// Registers the built-in command-lets (FC 0x01–0x06, 0x0F, 0x10,
    /// 0x16, 0x17) over a shared data model. Read commands are barred from
    /// broadcast requests; writes are allowed.
    pub fn register_builtin<M>(&mut self, model: Arc<Mutex<M>>) -> Result<(), SlaveError>
    where
        M: DataModel + 'static,
    {
        self.register(
            function::READ_COILS,
            cmdlet::read_coils::handler(model.clone()),
            true,
            false,
        )?;
        self.register(
            function::READ_DISCRETE_INPUTS,
            cmdlet::read_discrete_inputs::handler(model.clone()),
            true,
            false,
        )?;
        self.register(
            function::READ_HOLDING_REGISTERS,
            cmdlet::read_holding_registers::handler(model.clone()),
            true,
            false,
        )?;
        self.register(
            function::READ_INPUT_REGISTERS,
            cmdlet::read_input_registers::handler(model.clone()),
            true,
            false,
        )?;
        self.register(
            function::WRITE_SINGLE_COIL,
            cmdlet::write_single_coil::handler(model.clone()),
            false,
            false,
        )?;
        self.register(
            function::WRITE_SINGLE_REGISTER,
            cmdlet::write_single_register::handler(model.clone()),
            false,
            false,
        )?;
        self.register(
            function::WRITE_MULTIPLE_COILS,
            cmdlet::write_multiple_coils::handler(model.clone()),
            false,
            false,
        )?;
        self.register(
            function::WRITE_MULTIPLE_REGISTERS,
            cmdlet::write_multiple_registers::handler(model.clone()),
            false,
            false,
        )?;
        self.register(
            function::MASK_WRITE_REGISTER,
            cmdlet::mask_write_register::handler(model.clone()),
            false,
            false,
        )?;
        self.register(
            function::READ_WRITE_MULTIPLE_REGISTERS,
            cmdlet::read_write_multiple_registers::handler(model),
            true,
            false,
        )?;
        Ok(())
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            bus_message: self.counters.bus_message.load(Ordering::Relaxed),
            bus_comm_error: self.counters.bus_comm_error.load(Ordering::Relaxed),
            slave_message: self.counters.slave_message.load(Ordering::Relaxed),
            slave_exception: self.counters.slave_exception.load(Ordering::Relaxed),
            slave_no_response: self.counters.slave_no_response.load(Ordering::Relaxed),
        }
    }

    pub fn clear_counters(&self) {
        self.counters.bus_message.store(0, Ordering::Relaxed);
        self.counters.bus_comm_error.store(0, Ordering::Relaxed);
        self.counters.slave_message.store(0, Ordering::Relaxed);
        self.counters.slave_exception.store(0, Ordering::Relaxed);
        self.counters.slave_no_response.store(0, Ordering::Relaxed);
    }

    /// Enters listen-only mode: frames are decoded and counted but nothing
    /// is transmitted.
    pub fn enter_listen_only(&self) -> Result<(), StackError> {
        match self.core.set_listen_only(true) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SlaveError::ListenOnlyAlreadyEntered.into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Leaves listen-only mode.
    pub fn exit_listen_only(&self) -> Result<(), StackError> {
        match self.core.set_listen_only(false) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SlaveError::ListenOnlyAlreadyExited.into()),
            Err(err) => Err(err.into()),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Processes at most one received frame. Returns `true` when a frame
    /// was consumed, `false` on the periodic tick.
    pub async fn poll(&mut self) -> Result<bool, StackError> {
        let tick = Duration::from_millis(self.config.poll_tick_ms);
        let received = match self.core.wait_frame(tick).await {
            Ok(Some(received)) => received,
            Ok(None) => return Ok(false),
            Err(err) => return Err(SlaveError::from(err).into()),
        };

        Self::bump(&self.counters.bus_message);
        if received.flags.intersects(FrameFlags::COMM_ERRORS) {
            Self::bump(&self.counters.bus_comm_error);
            debug!(flags = ?received.flags, "frame discarded: communication error");
            return Ok(true);
        }

        let frame = received.frame;
        let broadcast = frame.is_broadcast();
        if !broadcast && frame.address != self.config.unit_address {
            trace!(
                address = frame.address,
                unit = self.config.unit_address,
                "frame dropped: address mismatch"
            );
            return Ok(true);
        }
        Self::bump(&self.counters.slave_message);

        let listen_only = self.core.is_listen_only();

        let outcome = match self.table.lookup_mut(frame.function) {
            None => {
                debug!(
                    function = %format_args!("{:#04x}", frame.function),
                    "unknown function code"
                );
                Some((
                    frame.function | EXCEPTION_BIT,
                    vec![ExceptionCode::IllegalFunction.as_byte()],
                ))
            }
            Some(entry) => {
                if entry.no_broadcast && broadcast {
                    trace!(
                        function = %format_args!("{:#04x}", frame.function),
                        "broadcast not allowed for this command, dropped"
                    );
                    Self::bump(&self.counters.slave_no_response);
                    return Ok(true);
                }
                if entry.no_listen_only && listen_only {
                    trace!(
                        function = %format_args!("{:#04x}", frame.function),
                        "command not allowed in listen-only mode, dropped"
                    );
                    Self::bump(&self.counters.slave_no_response);
                    return Ok(true);
                }

                let request = Request {
                    function: frame.function,
                    data: &frame.data,
                };
                let mut response = Response::new(frame.function, &mut self.response_buf);
                match (entry.handler)(&request, &mut response) {
                    Ok(()) => {}
                    Err(SlaveError::RequestTruncated) => {
                        response.set_exception(frame.function, ExceptionCode::IllegalDataValue)?;
                    }
                    Err(SlaveError::ResponseTruncated) | Err(SlaveError::CallbackFailed(_)) => {
                        warn!(
                            function = %format_args!("{:#04x}", frame.function),
                            "command handler failed"
                        );
                        response
                            .set_exception(frame.function, ExceptionCode::ServerDeviceFailure)?;
                    }
                    Err(other) => return Err(other.into()),
                }
                let response_function = response.function();
                let written = response.written();
                Some((
                    response_function,
                    self.response_buf[..written].to_vec(),
                ))
            }
        };

        if broadcast || listen_only {
            // Broadcast requests are executed but never answered; the same
            // holds for everything while listening only.
            Self::bump(&self.counters.slave_no_response);
            return Ok(true);
        }

        let Some((response_function, response_data)) = outcome else {
            return Ok(true);
        };

        if response_function & EXCEPTION_BIT != 0 {
            Self::bump(&self.counters.slave_exception);
        }

        if self.config.delay_before_reply_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_before_reply_ms)).await;
        }

        let reply = Frame::new(self.config.unit_address, response_function, response_data);
        let sent = self.core.transmit(&reply).await?;
        if !sent {
            Self::bump(&self.counters.slave_no_response);
        }
        Ok(true)
    }
}

impl std::fmt::Debug for Slave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slave")
            .field("unit_address", &self.config.unit_address)
            .field("commands", &self.table.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::cmdlet::testing::MemoryModel;
    use super::*;
    use crate::codec::rtu::RtuEncoder;
    use crate::codec::TransmissionMode;
    use crate::config::SerialConfig;
    use crate::driver::mock::{MockDriver, MockState};
    use crate::driver::DriverSink;

    fn rtu_slave(unit: u8) -> (Slave, Arc<Mutex<MockState>>, Arc<Mutex<MemoryModel>>) {
        let (driver, state) = MockDriver::new();
        let core = Transmission::new(
            Box::new(driver),
            TransmissionMode::Rtu,
            SerialConfig::default(),
        )
        .unwrap();
        core.open().unwrap();

        let model = Arc::new(Mutex::new(MemoryModel::default()));
        let mut slave = Slave::new(
            core,
            SlaveConfig {
                unit_address: unit,
                poll_tick_ms: 10,
                ..SlaveConfig::default()
            },
        )
        .unwrap();
        slave.register_builtin(model.clone()).unwrap();
        (slave, state, model)
    }

    fn ascii_slave(unit: u8) -> (Slave, Arc<Mutex<MockState>>, Arc<Mutex<MemoryModel>>) {
        let (driver, state) = MockDriver::new();
        let core = Transmission::new(
            Box::new(driver),
            TransmissionMode::Ascii,
            SerialConfig::default(),
        )
        .unwrap();
        core.open().unwrap();

        let model = Arc::new(Mutex::new(MemoryModel::default()));
        let mut slave = Slave::new(
            core,
            SlaveConfig {
                unit_address: unit,
                poll_tick_ms: 10,
                ..SlaveConfig::default()
            },
        )
        .unwrap();
        slave.register_builtin(model.clone()).unwrap();
        (slave, state, model)
    }

    fn encode_rtu(frame: &Frame) -> Vec<u8> {
        let mut encoder = RtuEncoder::new(frame);
        let mut out = Vec::new();
        while encoder.has_next() {
            out.push(encoder.next().unwrap());
        }
        out
    }

    /// Feeds raw bytes into the slave's core and runs the RTU frame gate.
    fn feed_rtu(slave: &Slave, state: &Arc<Mutex<MockState>>, bytes: &[u8]) {
        state.lock().unwrap().rx_queue.extend(bytes.iter().copied());
        slave.core.rx_ready();
        for _ in 0..7 {
            slave.core.half_char_tick();
        }
    }

    fn feed_ascii(slave: &Slave, state: &Arc<Mutex<MockState>>, chars: &[u8]) {
        state.lock().unwrap().rx_queue.extend(chars.iter().copied());
        slave.core.rx_ready();
    }

    #[tokio::test]
    async fn test_rtu_read_holding_registers_end_to_end() {
        let (mut slave, state, model) = rtu_slave(0x0B);
        {
            let mut model = model.lock().unwrap();
            model.holding_registers.insert(0, 0xAE41);
            model.holding_registers.insert(1, 0x5652);
        }

        feed_rtu(&slave, &state, &[0x0B, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0xA1]);
        assert!(slave.poll().await.unwrap());

        let tx = state.lock().unwrap().tx_bytes.clone();
        assert_eq!(tx, [0x0B, 0x03, 0x04, 0xAE, 0x41, 0x56, 0x52, 0x9E, 0x92]);

        let counters = slave.counters();
        assert_eq!(counters.bus_message, 1);
        assert_eq!(counters.slave_message, 1);
        assert_eq!(counters.slave_exception, 0);
    }

    #[tokio::test]
    async fn test_ascii_read_coils_end_to_end() {
        let (mut slave, state, model) = ascii_slave(0x01);
        {
            let mut model = model.lock().unwrap();
            for (address, value) in [1, 0, 1, 1, 0, 0, 1, 0, 1, 1].iter().enumerate() {
                model.coils.insert(address as u16, *value == 1);
            }
        }

        feed_ascii(&slave, &state, b":01010000000AF4\r\n");
        assert!(slave.poll().await.unwrap());

        let tx = state.lock().unwrap().tx_bytes.clone();
        assert_eq!(tx, b":010102CD012E\r\n");
    }

    #[tokio::test]
    async fn test_broadcast_write_executes_without_reply() {
        let (mut slave, state, model) = rtu_slave(0x0B);
        model.lock().unwrap().holding_registers.insert(5, 0);

        let request = Frame::new(0, 0x06, vec![0x00, 0x05, 0x00, 0xFF]);
        feed_rtu(&slave, &state, &encode_rtu(&request));
        assert!(slave.poll().await.unwrap());

        assert_eq!(model.lock().unwrap().holding_registers[&5], 0x00FF);
        assert!(state.lock().unwrap().tx_bytes.is_empty());
        assert_eq!(slave.counters().slave_no_response, 1);
    }

    #[tokio::test]
    async fn test_broadcast_read_silently_dropped() {
        let (mut slave, state, model) = rtu_slave(0x0B);
        model.lock().unwrap().holding_registers.insert(0, 1);

        let request = Frame::new(0, 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        feed_rtu(&slave, &state, &encode_rtu(&request));
        assert!(slave.poll().await.unwrap());

        assert!(state.lock().unwrap().tx_bytes.is_empty());
        assert_eq!(slave.counters().slave_no_response, 1);
    }

    #[tokio::test]
    async fn test_unknown_function_yields_illegal_function() {
        let (mut slave, state, _model) = rtu_slave(0x0B);

        let request = Frame::new(0x0B, 0x30, vec![0x01, 0x02]);
        feed_rtu(&slave, &state, &encode_rtu(&request));
        assert!(slave.poll().await.unwrap());

        let tx = state.lock().unwrap().tx_bytes.clone();
        // Address, fn | 0x80, exception code, CRC.
        assert_eq!(&tx[..3], &[0x0B, 0xB0, 0x01]);
        assert_eq!(slave.counters().slave_exception, 1);
    }

    #[tokio::test]
    async fn test_address_mismatch_dropped() {
        let (mut slave, state, model) = rtu_slave(0x0B);
        model.lock().unwrap().holding_registers.insert(0, 1);

        let request = Frame::new(0x0C, 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        feed_rtu(&slave, &state, &encode_rtu(&request));
        assert!(slave.poll().await.unwrap());

        assert!(state.lock().unwrap().tx_bytes.is_empty());
        let counters = slave.counters();
        assert_eq!(counters.bus_message, 1);
        assert_eq!(counters.slave_message, 0);
    }

    #[tokio::test]
    async fn test_comm_error_counted_and_discarded() {
        let (mut slave, state, _model) = rtu_slave(0x0B);

        feed_rtu(&slave, &state, &[0x0B, 0x03, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]);
        assert!(slave.poll().await.unwrap());

        assert!(state.lock().unwrap().tx_bytes.is_empty());
        let counters = slave.counters();
        assert_eq!(counters.bus_message, 1);
        assert_eq!(counters.bus_comm_error, 1);
        assert_eq!(counters.slave_message, 0);
    }

    #[tokio::test]
    async fn test_listen_only_suppresses_response() {
        let (mut slave, state, model) = rtu_slave(0x0B);
        model.lock().unwrap().holding_registers.insert(0, 0xBEEF);
        slave.enter_listen_only().unwrap();

        let request = Frame::new(0x0B, 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        feed_rtu(&slave, &state, &encode_rtu(&request));
        assert!(slave.poll().await.unwrap());

        assert!(state.lock().unwrap().tx_bytes.is_empty());
        let counters = slave.counters();
        assert_eq!(counters.slave_message, 1);
        assert_eq!(counters.slave_no_response, 1);

        // Re-entering is an error, leaving once is not.
        assert!(slave.enter_listen_only().is_err());
        slave.exit_listen_only().unwrap();
        assert!(slave.exit_listen_only().is_err());
    }

    #[tokio::test]
    async fn test_poll_tick_without_frame() {
        let (mut slave, _state, _model) = rtu_slave(0x0B);
        assert!(!slave.poll().await.unwrap());
        assert_eq!(slave.counters().bus_message, 0);
    }

    #[tokio::test]
    async fn test_handler_fault_yields_server_device_failure() {
        let (mut slave, state, model) = rtu_slave(0x0B);
        {
            let mut model = model.lock().unwrap();
            model.holding_registers.insert(0, 1);
            model.faulty = true;
        }

        let request = Frame::new(0x0B, 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        feed_rtu(&slave, &state, &encode_rtu(&request));
        assert!(slave.poll().await.unwrap());

        let tx = state.lock().unwrap().tx_bytes.clone();
        assert_eq!(&tx[..3], &[0x0B, 0x83, 0x04]);
        assert_eq!(slave.counters().slave_exception, 1);
    }

    #[tokio::test]
    async fn test_clear_counters() {
        let (mut slave, state, _model) = rtu_slave(0x0B);
        feed_rtu(&slave, &state, &[0x01, 0x02, 0x03]);
        let _ = slave.poll().await.unwrap();
        assert!(slave.counters().bus_message > 0);
        slave.clear_counters();
        assert_eq!(slave.counters(), CounterSnapshot::default());
    }
}

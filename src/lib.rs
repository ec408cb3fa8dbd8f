pub mod checksum;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod errors;
pub mod frame;
pub mod logging;
pub mod master;
pub mod os;
pub mod serial;
pub mod slave;
pub mod transmission;

pub use codec::TransmissionMode;
pub use config::{DataBits, MasterConfig, Parity, SerialConfig, SlaveConfig, StopBits};
pub use cursor::{BufferEmitter, BufferFetcher};
pub use driver::{DriverCallbacks, DriverSink, DuplexMode, LineErrors, SerialDriver};
pub use errors::{
    ConfigError, CursorError, DecodeError, DeviceError, EncodeError, MasterError, OsError,
    SlaveError, StackError,
};
pub use frame::{ExceptionCode, Frame, FrameFlags, ReceivedFrame};
pub use logging::setup_logging;
pub use master::{Master, TransactionState};
pub use serial::SerialPortDriver;
pub use slave::cmdlet::{DataModel, ModelError};
pub use slave::{CommandTableLayout, CounterSnapshot, Slave};
pub use transmission::Transmission;

mod codec;
mod config;
mod cursor;
mod device;
mod master;
mod os;
mod slave;
mod stack;

pub use codec::DecodeError;
pub use codec::EncodeError;
pub use config::ConfigError;
pub use cursor::CursorError;
pub use device::DeviceError;
pub use master::MasterError;
pub use os::OsError;
pub use slave::SlaveError;
pub use stack::StackError;

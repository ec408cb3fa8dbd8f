mod master;
mod serial;
mod slave;
mod types;

pub use master::Config as MasterConfig;
pub use serial::Config as SerialConfig;
pub use serial::{MAX_BAUD_RATE, MIN_BAUD_RATE};
pub use slave::Config as SlaveConfig;
pub use types::{DataBits, Parity, StopBits};

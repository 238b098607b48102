//! Serial Protocol Communication
//!
//! Implements the SportIdent extended protocol spoken by master stations:
//! command bytes, message framing with CRC, and serial port access.

pub mod commands;
mod error;
pub mod frame;
mod message;
pub mod serial;

pub use error::ProtocolError;
pub use frame::SiCodec;
pub use message::Message;
pub use serial::{list_ports, open_port, PortInfo};

/// Baud rate of stations configured for high speed
pub const HIGH_BAUD_RATE: u32 = 38400;

/// Baud rate of stations configured for low speed
pub const LOW_BAUD_RATE: u32 = 4800;

/// Default timeout for answers from the station in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default number of messages buffered between reader and driver
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

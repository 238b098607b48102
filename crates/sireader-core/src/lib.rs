//! # SiReader Core Library
//!
//! Core functionality for reading SportIdent punch cards through a master
//! station.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The SportIdent extended protocol framing and commands
//! - The protocol state machine driving a master station
//! - A bounded message queue between the serial reader and the driver
//! - Serial port discovery and link setup
//!
//! ## Example
//!
//! ```rust,ignore
//! use sireader_core::{config::DriverConfig, driver::SiDriver, link::SerialLink};
//!
//! let config = DriverConfig::new("/dev/ttyUSB0");
//! let link = SerialLink::open(&config)?;
//!
//! // `handler` implements SiHandler and receives status and card data
//! let driver = SiDriver::new(link.queue, link.writer, handler).start();
//! // ...
//! driver.stop().await;
//! ```

pub mod config;
pub mod dataframe;
pub mod driver;
pub mod link;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DriverConfig;
    pub use crate::dataframe::CardDataFrame;
    pub use crate::driver::{
        CommStatus, CommWriter, DriverExit, DriverHandle, DriverState, MessageQueue, SiDriver,
        SiHandler,
    };
    pub use crate::link::SerialLink;
    pub use crate::protocol::{Message, ProtocolError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! SportIdent driver
//!
//! The protocol state machine, the message queue feeding it and the loop
//! that runs it against a master station.

mod handler;
mod queue;
mod runner;
mod state;

use async_trait::async_trait;

use crate::protocol::{Message, ProtocolError};

pub use handler::{CommStatus, SiHandler};
pub use queue::{MessageQueue, MessageSender};
pub use runner::{DriverExit, DriverHandle, SiDriver};
pub use state::DriverState;

/// Outbound side of the link to the station
#[async_trait]
pub trait CommWriter: Send {
    /// Transmit one message; a failure stops the driver
    async fn write(&mut self, message: &Message) -> Result<(), ProtocolError>;
}

#[async_trait]
impl<W: CommWriter + ?Sized> CommWriter for Box<W> {
    async fn write(&mut self, message: &Message) -> Result<(), ProtocolError> {
        (**self).write(message).await
    }
}

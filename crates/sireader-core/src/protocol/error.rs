//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to a master station
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Timeout waiting for master station")]
    Timeout,

    #[error("Invalid message: expected command {expected:#04x}, got {actual:#04x}")]
    InvalidMessage { expected: u8, actual: u8 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("{operation} should not be called on {state}")]
    IllegalOperation {
        state: &'static str,
        operation: &'static str,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Errors a card session can recover from by returning to the ready state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout | ProtocolError::InvalidMessage { .. }
        )
    }

    /// A state was asked to perform an operation it does not define.
    ///
    /// This is a bug in the caller, never something the station caused.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, ProtocolError::IllegalOperation { .. })
    }
}

impl From<tokio_serial::Error> for ProtocolError {
    fn from(e: tokio_serial::Error) -> Self {
        match e.kind {
            tokio_serial::ErrorKind::NoDevice => ProtocolError::PortNotFound(e.description),
            _ => ProtocolError::SerialError(e.to_string()),
        }
    }
}

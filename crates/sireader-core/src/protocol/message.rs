//! Decoded protocol messages

use std::fmt;

use super::commands::{self, STX};

/// A decoded frame exchanged with the master station.
///
/// Messages are immutable: once decoded they move into the queue and then
/// to the state that consumes them.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    command: u8,
    data: Vec<u8>,
}

impl Message {
    /// Create a message from its command byte and data bytes
    pub fn new(command: u8, data: Vec<u8>) -> Self {
        Self { command, data }
    }

    /// Command identifier
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Data bytes, without framing or CRC
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether this message answers `expected`
    pub fn matches(&self, expected: u8) -> bool {
        self.command == expected
    }

    /// Byte at `index` in wire-frame coordinates.
    ///
    /// Index 0 is STX, 1 the command, 2 the data length and 3.. the data.
    /// Unframed messages only have index 0 (the command itself). A message
    /// with more data than a length byte can count has no index 2.
    pub fn sequence(&self, index: usize) -> Option<u8> {
        if commands::is_unframed(self.command) {
            return (index == 0).then_some(self.command);
        }
        match index {
            0 => Some(STX),
            1 => Some(self.command),
            2 => u8::try_from(self.data.len()).ok(),
            i => self.data.get(i - 3).copied(),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message({} {:#04x} [",
            commands::command_name(self.command),
            self.command
        )?;
        for (i, b) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, "])")
    }
}

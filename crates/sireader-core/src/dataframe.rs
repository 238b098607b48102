//! Card data frames
//!
//! What the driver hands to its [`SiHandler`](crate::driver::SiHandler)
//! after a successful card read: the validated data blocks as received from
//! the station, tagged with the card family and the time of the read.
//! Interpreting punches and times inside the blocks is left to the consumer.

use chrono::{DateTime, Local};

use crate::protocol::Message;

/// Card data read from a master station
#[derive(Debug, Clone, PartialEq)]
pub enum CardDataFrame {
    /// Card 5: a single data block
    SiCard5 {
        block: Message,
        read_at: DateTime<Local>,
    },
    /// Card 8 and later: blocks 0 and 1, in that order
    SiCard8Plus {
        blocks: [Message; 2],
        read_at: DateTime<Local>,
    },
}

impl CardDataFrame {
    pub fn sicard_5(block: Message) -> Self {
        CardDataFrame::SiCard5 {
            block,
            read_at: Local::now(),
        }
    }

    pub fn sicard_8_plus(blocks: [Message; 2]) -> Self {
        CardDataFrame::SiCard8Plus {
            blocks,
            read_at: Local::now(),
        }
    }

    /// Card family name
    pub fn series(&self) -> &'static str {
        match self {
            CardDataFrame::SiCard5 { .. } => "SiCard 5",
            CardDataFrame::SiCard8Plus { .. } => "SiCard 8/9",
        }
    }

    /// Raw data blocks in read order
    pub fn blocks(&self) -> &[Message] {
        match self {
            CardDataFrame::SiCard5 { block, .. } => std::slice::from_ref(block),
            CardDataFrame::SiCard8Plus { blocks, .. } => blocks,
        }
    }

    /// Local time the read completed
    pub fn read_at(&self) -> DateTime<Local> {
        match self {
            CardDataFrame::SiCard5 { read_at, .. } | CardDataFrame::SiCard8Plus { read_at, .. } => {
                *read_at
            }
        }
    }
}

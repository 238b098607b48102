//! Driver notifications

use serde::{Deserialize, Serialize};

use crate::dataframe::CardDataFrame;

/// Lifecycle status reported to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommStatus {
    /// Driver started, handshake in progress
    Starting,
    /// Handshake done, station in extended protocol
    On,
    /// Waiting for a card
    Ready,
    /// Handling a frame from the station
    Processing,
    /// Card session abandoned, driver still running
    ProcessingError,
    /// Driver stopping on an unrecoverable error
    FatalError,
    /// Driver stopped
    Off,
}

/// Receiver of everything the driver reports.
///
/// Called from the driver task, in the order events happen.
pub trait SiHandler: Send {
    fn notify(&mut self, status: CommStatus);

    fn notify_data(&mut self, frame: CardDataFrame);

    /// Only used with [`CommStatus::FatalError`]
    fn notify_error(&mut self, status: CommStatus, message: &str);
}

impl<H: SiHandler + ?Sized> SiHandler for Box<H> {
    fn notify(&mut self, status: CommStatus) {
        (**self).notify(status)
    }

    fn notify_data(&mut self, frame: CardDataFrame) {
        (**self).notify_data(frame)
    }

    fn notify_error(&mut self, status: CommStatus, message: &str) {
        (**self).notify_error(status, message)
    }
}

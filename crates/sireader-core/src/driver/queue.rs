//! Message queue between the link reader and the driver
//!
//! A bounded FIFO: the reader waits when the queue is full, the driver
//! either waits indefinitely ([`MessageQueue::take`]) or up to the
//! configured timeout ([`MessageQueue::timeout_poll`]). Every wait also
//! races the cancellation token.
//!
//! A failing link reader reports through [`MessageSender::fail`]; the
//! driver receives that error in order, after the messages queued before it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, ProtocolError};

type Item = Result<Message, ProtocolError>;

/// Producer side of a [`MessageQueue`]
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Item>,
    cancel: CancellationToken,
}

impl MessageSender {
    /// Enqueue a message, waiting while the queue is full
    pub async fn add(&self, message: Message) -> Result<(), ProtocolError> {
        self.push(Ok(message)).await
    }

    /// Report that the source feeding this queue has failed.
    ///
    /// The consumer's next wait past the already queued messages returns
    /// `error`.
    pub async fn fail(&self, error: ProtocolError) -> Result<(), ProtocolError> {
        self.push(Err(error)).await
    }

    async fn push(&self, item: Item) -> Result<(), ProtocolError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProtocolError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| ProtocolError::Cancelled),
        }
    }
}

/// Consumer side, owned by the driver
#[derive(Debug)]
pub struct MessageQueue {
    rx: mpsc::Receiver<Item>,
    sender: MessageSender,
    timeout: Duration,
}

impl MessageQueue {
    /// Create a queue with its own cancellation token
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self::with_cancellation(capacity, timeout, CancellationToken::new())
    }

    /// Create a queue whose waits end when `cancel` fires
    pub fn with_cancellation(capacity: usize, timeout: Duration, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            rx,
            sender: MessageSender { tx, cancel },
            timeout,
        }
    }

    /// A producer handle for the link reader
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Token that interrupts every wait on this queue
    pub fn cancellation(&self) -> CancellationToken {
        self.sender.cancel.clone()
    }

    /// Configured poll timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Enqueue through the queue's own sender
    pub async fn add(&self, message: Message) -> Result<(), ProtocolError> {
        self.sender.add(message).await
    }

    /// Wait for the next message, however long it takes
    pub async fn take(&mut self) -> Result<Message, ProtocolError> {
        tokio::select! {
            biased;
            _ = self.sender.cancel.cancelled() => Err(ProtocolError::Cancelled),
            // The queue holds a sender, so the channel never closes
            received = self.rx.recv() => received.unwrap_or(Err(ProtocolError::Cancelled)),
        }
    }

    /// Wait for the next message at most the configured timeout
    pub async fn timeout_poll(&mut self) -> Result<Message, ProtocolError> {
        tokio::select! {
            biased;
            _ = self.sender.cancel.cancelled() => Err(ProtocolError::Cancelled),
            polled = tokio::time::timeout(self.timeout, self.rx.recv()) => match polled {
                Ok(Some(item)) => item,
                Ok(None) => Err(ProtocolError::Cancelled),
                Err(_) => Err(ProtocolError::Timeout),
            },
        }
    }
}

//! Serial link to a master station
//!
//! Splits an open port into a reader task that decodes frames into the
//! driver's queue and a [`CommWriter`] that encodes outbound messages.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_serial::SerialStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::driver::{CommWriter, MessageQueue, MessageSender};
use crate::protocol::{open_port, Message, ProtocolError, SiCodec};

/// Writes messages to the link through the frame codec
pub struct LinkWriter<T> {
    sink: FramedWrite<WriteHalf<T>, SiCodec>,
}

#[async_trait]
impl<T> CommWriter for LinkWriter<T>
where
    T: AsyncWrite + Send,
{
    async fn write(&mut self, message: &Message) -> Result<(), ProtocolError> {
        debug!("Sending {:?}", message);
        self.sink.send(message.clone()).await
    }
}

/// Writer half of a serial port link
pub type SerialWriter = LinkWriter<SerialStream>;

/// Read frames into the queue.
///
/// A read error or the end of the stream is handed to the driver as a
/// transport failure.
async fn read_frames<R>(mut frames: FramedRead<R, SiCodec>, sender: MessageSender)
where
    R: AsyncRead + Unpin,
{
    let failure = loop {
        match frames.next().await {
            Some(Ok(message)) => {
                debug!("Received {:?}", message);
                if sender.add(message).await.is_err() {
                    debug!("Link reader finished");
                    return;
                }
            }
            Some(Err(e)) => {
                warn!("Link read failed: {}", e);
                break e;
            }
            None => {
                warn!("Link closed by the station");
                break ProtocolError::SerialError("link closed".into());
            }
        }
    };

    if sender.fail(failure).await.is_err() {
        debug!("Link failure not delivered, queue cancelled");
    }
}

/// Wire any duplex byte stream to a driver queue.
///
/// Returns the writer for the driver and the reader task feeding `queue`.
pub fn attach<T>(stream: T, queue: &MessageQueue) -> (LinkWriter<T>, JoinHandle<()>)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half): (ReadHalf<T>, WriteHalf<T>) = tokio::io::split(stream);
    let sender = queue.sender();
    let cancel = queue.cancellation();
    let frames = FramedRead::new(read_half, SiCodec::new());

    let reader = tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => debug!("Link reader cancelled"),
            _ = read_frames(frames, sender) => {}
        }
    });

    let writer = LinkWriter {
        sink: FramedWrite::new(write_half, SiCodec::new()),
    };
    (writer, reader)
}

/// An opened serial link, ready to hand to a [`SiDriver`](crate::driver::SiDriver)
pub struct SerialLink {
    pub queue: MessageQueue,
    pub writer: SerialWriter,
    pub reader: JoinHandle<()>,
}

impl SerialLink {
    /// Open the configured port and a queue bound to it
    pub fn open(config: &DriverConfig) -> Result<Self, ProtocolError> {
        let stream = open_port(&config.port_name, Some(config.baud_rate))?;
        info!("Opened {} at {} baud", config.port_name, config.baud_rate);

        let queue = MessageQueue::new(config.queue_capacity, config.timeout());
        let (writer, reader) = attach(stream, &queue);
        Ok(Self {
            queue,
            writer,
            reader,
        })
    }
}

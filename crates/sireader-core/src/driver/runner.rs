//! Driver loop

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{CommStatus, CommWriter, DriverState, MessageQueue, SiHandler};
use crate::protocol::ProtocolError;

/// How a driver run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverExit {
    /// Stop was requested; no fatal notification was emitted
    Stopped,
    /// The run ended on an unrecoverable error, already reported to the handler
    Failed(String),
}

/// Drives one master station until stopped or until it fails
pub struct SiDriver<W, H> {
    queue: MessageQueue,
    writer: W,
    handler: H,
    cancel: CancellationToken,
}

impl<W, H> SiDriver<W, H>
where
    W: CommWriter,
    H: SiHandler,
{
    /// The driver stops when the queue's cancellation token fires
    pub fn new(queue: MessageQueue, writer: W, handler: H) -> Self {
        let cancel = queue.cancellation();
        Self {
            queue,
            writer,
            handler,
            cancel,
        }
    }

    /// Run the protocol on the current task
    pub async fn run(mut self) -> DriverExit {
        info!("Starting master station driver");
        self.handler.notify(CommStatus::Starting);

        let cancel = self.cancel.clone();
        let mut state = DriverState::Startup;
        loop {
            if cancel.is_cancelled() {
                info!("Driver stopped in {}", state);
                return DriverExit::Stopped;
            }

            // Covers writes too, which do not watch the token themselves
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProtocolError::Cancelled),
                step = async {
                    if state.is_send_state() {
                        state.send(&mut self.writer).await
                    } else {
                        state
                            .receive(&mut self.queue, &mut self.writer, &mut self.handler)
                            .await
                    }
                } => step,
            };

            match step {
                Ok(next) => {
                    debug!("State changed: {} -> {}", state, next);
                    state = next;
                    if state.is_error() {
                        return self.fatal(state.status());
                    }
                }
                Err(ProtocolError::Cancelled) => {
                    info!("Driver stopped in {}", state);
                    return DriverExit::Stopped;
                }
                Err(ProtocolError::Timeout) if state == DriverState::StartupCheck => {
                    return self.fatal(DriverState::StartupTimeout.status());
                }
                Err(e) => {
                    return self.fatal(&format!("{} ({})", e, state));
                }
            }
        }
    }

    /// Spawn the loop on the tokio runtime
    pub fn start(self) -> DriverHandle
    where
        W: 'static,
        H: 'static,
    {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        DriverHandle { cancel, task }
    }

    fn fatal(&mut self, message: &str) -> DriverExit {
        error!("Driver failed: {}", message);
        self.handler.notify_error(CommStatus::FatalError, message);
        self.handler.notify(CommStatus::Off);
        DriverExit::Failed(message.to_string())
    }
}

/// Control handle for a spawned driver
#[derive(Debug)]
pub struct DriverHandle {
    cancel: CancellationToken,
    task: JoinHandle<DriverExit>,
}

impl DriverHandle {
    /// Ask the driver to stop; does nothing if it already ended
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the driver task to end
    pub async fn join(self) -> DriverExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => DriverExit::Failed(format!("driver task aborted: {}", e)),
        }
    }

    /// Request a stop and wait for it
    pub async fn stop(self) -> DriverExit {
        self.request_stop();
        self.join().await
    }
}

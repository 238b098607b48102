//! Protocol state machine
//!
//! Each state either sends the next request to the station or receives and
//! interprets the next message from it. States carry no data: a transition
//! depends only on the state and the message consumed.

use std::fmt;

use tracing::{debug, error};

use super::{CommStatus, CommWriter, MessageQueue, SiHandler};
use crate::dataframe::CardDataFrame;
use crate::protocol::commands::*;
use crate::protocol::{Message, ProtocolError};

/// States of the master station protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    Startup,
    StartupCheck,
    StartupTimeout,
    GetConfig,
    ExtendedProtocolCheck,
    ExtendedProtocolError,
    DispatchReady,
    ReadSiCard5,
    WaitSiCard5Data,
    RetrieveSiCard89Data,
    AckRead,
    WaitSiCardRemoval,
}

impl DriverState {
    pub fn name(self) -> &'static str {
        match self {
            DriverState::Startup => "STARTUP",
            DriverState::StartupCheck => "STARTUP_CHECK",
            DriverState::StartupTimeout => "STARTUP_TIMEOUT",
            DriverState::GetConfig => "GET_CONFIG",
            DriverState::ExtendedProtocolCheck => "EXTENDED_PROTOCOL_CHECK",
            DriverState::ExtendedProtocolError => "EXTENDED_PROTOCOL_ERROR",
            DriverState::DispatchReady => "DISPATCH_READY",
            DriverState::ReadSiCard5 => "READ_SICARD_5",
            DriverState::WaitSiCard5Data => "WAIT_SICARD_5_DATA",
            DriverState::RetrieveSiCard89Data => "RETRIEVE_SICARD_8_9_DATA",
            DriverState::AckRead => "ACK_READ",
            DriverState::WaitSiCardRemoval => "WAIT_SICARD_REMOVAL",
        }
    }

    /// Terminal states reached when the station cannot be driven
    pub fn is_error(self) -> bool {
        matches!(
            self,
            DriverState::StartupTimeout | DriverState::ExtendedProtocolError
        )
    }

    /// Human-readable status, explains the failure for error states
    pub fn status(self) -> &'static str {
        match self {
            DriverState::StartupTimeout => {
                "Master station did not answer to startup sequence (high/low baud)"
            }
            DriverState::ExtendedProtocolError => {
                "Master station should be configured with extended protocol"
            }
            other => other.name(),
        }
    }

    /// Whether this state defines `send` (otherwise it defines `receive`,
    /// unless it is an error state)
    pub fn is_send_state(self) -> bool {
        matches!(
            self,
            DriverState::Startup
                | DriverState::GetConfig
                | DriverState::ReadSiCard5
                | DriverState::AckRead
        )
    }

    /// Whether this state defines `receive`
    pub fn is_receive_state(self) -> bool {
        !self.is_send_state() && !self.is_error()
    }

    /// Send the request this state stands for
    pub async fn send<W>(self, writer: &mut W) -> Result<DriverState, ProtocolError>
    where
        W: CommWriter + ?Sized,
    {
        let (message, next) = match self {
            DriverState::Startup => (startup_sequence(), DriverState::StartupCheck),
            DriverState::GetConfig => (
                get_protocol_configuration(),
                DriverState::ExtendedProtocolCheck,
            ),
            DriverState::ReadSiCard5 => (read_sicard_5(), DriverState::WaitSiCard5Data),
            DriverState::AckRead => (ack_sequence(), DriverState::WaitSiCardRemoval),
            _ => return Err(self.illegal("send")),
        };
        writer.write(&message).await?;
        Ok(next)
    }

    /// Consume the next message(s) from the station and decide where to go
    pub async fn receive<W, H>(
        self,
        queue: &mut MessageQueue,
        writer: &mut W,
        handler: &mut H,
    ) -> Result<DriverState, ProtocolError>
    where
        W: CommWriter + ?Sized,
        H: SiHandler + ?Sized,
    {
        match self {
            DriverState::StartupCheck => {
                poll_answer(queue, SET_MASTER_MODE).await?;
                DriverState::GetConfig.send(writer).await
            }

            DriverState::ExtendedProtocolCheck => {
                let message = poll_answer(queue, GET_SYSTEM_VALUE).await?;
                let config = message.sequence(PROTOCOL_CONFIG_INDEX).unwrap_or(0);
                if config & EXTENDED_PROTOCOL_MASK != 0 {
                    writer.write(&beep_twice()).await?;
                    handler.notify(CommStatus::On);
                    Ok(DriverState::DispatchReady)
                } else {
                    Ok(DriverState::ExtendedProtocolError)
                }
            }

            DriverState::DispatchReady => {
                handler.notify(CommStatus::Ready);
                let message = queue.take().await?;
                handler.notify(CommStatus::Processing);
                match message.command() {
                    SI_CARD_5_DETECTED => {
                        debug!("State changed: {}", DriverState::ReadSiCard5.name());
                        DriverState::ReadSiCard5.send(writer).await
                    }
                    SI_CARD_8_PLUS_DETECTED => {
                        debug!(
                            "State changed: {}",
                            DriverState::RetrieveSiCard89Data.name()
                        );
                        retrieve_sicard_8_plus(queue, writer, handler).await
                    }
                    BEEP => Ok(DriverState::DispatchReady),
                    _ => {
                        debug!("Unexpected message {:?}", message);
                        Ok(DriverState::DispatchReady)
                    }
                }
            }

            DriverState::WaitSiCard5Data => match poll_answer(queue, GET_SI_CARD_5).await {
                Ok(message) => {
                    handler.notify_data(CardDataFrame::sicard_5(message));
                    DriverState::AckRead.send(writer).await
                }
                Err(e) if e.is_recoverable() => Ok(error_fallback(handler, &e)),
                Err(e) => Err(e),
            },

            DriverState::RetrieveSiCard89Data => {
                retrieve_sicard_8_plus(queue, writer, handler).await
            }

            DriverState::WaitSiCardRemoval => match poll_answer(queue, SI_CARD_REMOVED).await {
                Ok(_) => Ok(DriverState::DispatchReady),
                Err(e) if e.is_recoverable() => Ok(error_fallback(handler, &e)),
                Err(e) => Err(e),
            },

            _ => Err(self.illegal("receive")),
        }
    }

    fn illegal(self, operation: &'static str) -> ProtocolError {
        ProtocolError::IllegalOperation {
            state: self.name(),
            operation,
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Next message from the queue, which must answer `command`
async fn poll_answer(queue: &mut MessageQueue, command: u8) -> Result<Message, ProtocolError> {
    let message = queue.timeout_poll().await?;
    if message.matches(command) {
        Ok(message)
    } else {
        Err(ProtocolError::InvalidMessage {
            expected: command,
            actual: message.command(),
        })
    }
}

/// Read blocks 0 and 1 of a card 8+, each reply checked against its request
async fn retrieve_sicard_8_plus<W, H>(
    queue: &mut MessageQueue,
    writer: &mut W,
    handler: &mut H,
) -> Result<DriverState, ProtocolError>
where
    W: CommWriter + ?Sized,
    H: SiHandler + ?Sized,
{
    let requests = [read_sicard_8_plus_b0(), read_sicard_8_plus_b1()];
    let mut blocks = Vec::with_capacity(requests.len());
    for request in &requests {
        writer.write(request).await?;
        match poll_answer(queue, request.command()).await {
            Ok(block) => blocks.push(block),
            Err(e) if e.is_recoverable() => return Ok(error_fallback(handler, &e)),
            Err(e) => return Err(e),
        }
    }

    let blocks: [Message; 2] = blocks
        .try_into()
        .map_err(|_| ProtocolError::InvalidFrame("expected two card blocks".into()))?;
    handler.notify_data(CardDataFrame::sicard_8_plus(blocks));
    DriverState::AckRead.send(writer).await
}

/// Abandon the card session and go back to waiting for cards
fn error_fallback<H>(handler: &mut H, error: &ProtocolError) -> DriverState
where
    H: SiHandler + ?Sized,
{
    error!("Card read failed: {}", error);
    handler.notify(CommStatus::ProcessingError);
    DriverState::DispatchReady
}

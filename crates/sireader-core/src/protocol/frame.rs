//! Frame encoding/decoding
//!
//! Implements the SportIdent extended protocol framing.
//!
//! Frame format:
//! - 1 byte: STX (0x02)
//! - 1 byte: Command
//! - 1 byte: Data length
//! - N bytes: Data
//! - 2 bytes: CRC (big-endian, over command, length and data)
//! - 1 byte: ETX (0x03)
//!
//! ACK and NAK travel as a single unframed byte. A frame may be preceded by
//! wakeup bytes and a repeated STX, which the decoder skips.

use byteorder::{BigEndian, ByteOrder};
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use super::commands::{self, ETX, SET_MASTER_MODE, STX, WAKEUP};
use super::{Message, ProtocolError};

/// STX, command and length
const HEADER_LEN: usize = 3;
/// CRC and ETX
const TRAILER_LEN: usize = 3;

const CRC_POLYNOMIAL: u16 = 0x8005;

/// Most data bytes a single length byte can describe
pub const MAX_DATA_LEN: usize = u8::MAX as usize;

/// Decode one complete frame
pub fn decode_frame(data: &[u8]) -> Result<Message, ProtocolError> {
    if data.len() < HEADER_LEN + TRAILER_LEN {
        return Err(ProtocolError::InvalidFrame(format!(
            "frame too short ({} bytes)",
            data.len()
        )));
    }
    if data[0] != STX {
        return Err(ProtocolError::InvalidFrame(format!(
            "expected STX, got {:#04x}",
            data[0]
        )));
    }

    let length = data[2] as usize;
    let total = HEADER_LEN + length + TRAILER_LEN;
    if data.len() != total {
        return Err(ProtocolError::InvalidFrame(format!(
            "length byte says {} bytes, frame has {}",
            total,
            data.len()
        )));
    }
    if data[total - 1] != ETX {
        return Err(ProtocolError::InvalidFrame(format!(
            "expected ETX, got {:#04x}",
            data[total - 1]
        )));
    }

    let body = &data[1..HEADER_LEN + length];
    let received = BigEndian::read_u16(&data[HEADER_LEN + length..total - 1]);
    let expected = crc16(body);
    if received != expected {
        return Err(ProtocolError::CrcMismatch {
            expected,
            actual: received,
        });
    }

    Ok(Message::new(
        data[1],
        data[HEADER_LEN..HEADER_LEN + length].to_vec(),
    ))
}

/// Encode a message to the bytes sent on the wire.
///
/// The data must fit [`MAX_DATA_LEN`]; [`SiCodec`] checks this before
/// encoding.
pub fn encode_frame(message: &Message) -> Vec<u8> {
    if commands::is_unframed(message.command()) {
        return vec![message.command()];
    }

    let data = message.data();
    debug_assert!(data.len() <= MAX_DATA_LEN, "frame data too long");
    let mut bytes = Vec::with_capacity(2 + HEADER_LEN + data.len() + TRAILER_LEN);

    // The bootstrap frame has to wake the station up first
    if message.command() == SET_MASTER_MODE {
        bytes.push(WAKEUP);
        bytes.push(STX);
    }

    let body_start = bytes.len() + 1;
    bytes.push(STX);
    bytes.push(message.command());
    bytes.push(data.len() as u8);
    bytes.extend_from_slice(data);

    let mut crc_bytes = [0u8; 2];
    BigEndian::write_u16(&mut crc_bytes, crc16(&bytes[body_start..]));
    bytes.extend_from_slice(&crc_bytes);
    bytes.push(ETX);

    bytes
}

/// SportIdent CRC-16.
///
/// Processes the input as big-endian 16-bit words, padding an odd trailing
/// byte with zero and appending a zero word when the length is even.
pub fn crc16(data: &[u8]) -> u16 {
    if data.len() < 2 {
        return 0;
    }

    let mut crc = BigEndian::read_u16(&data[0..2]);
    if data.len() == 2 {
        return crc;
    }

    let mut rest = &data[2..];
    for remaining in (1..=data.len() / 2).rev() {
        let mut word: u16 = if remaining > 1 {
            let w = BigEndian::read_u16(&rest[0..2]);
            rest = &rest[2..];
            w
        } else if data.len() % 2 == 1 {
            (rest[0] as u16) << 8
        } else {
            0
        };

        for _ in 0..16 {
            let carry = crc & 0x8000 != 0;
            crc <<= 1;
            if word & 0x8000 != 0 {
                crc += 1;
            }
            if carry {
                crc ^= CRC_POLYNOMIAL;
            }
            word <<= 1;
        }
    }

    crc
}

/// Bytes to drop after rejecting the frame candidate `frame`.
///
/// A frame with intact framing but a bad CRC is dropped whole. Otherwise the
/// length byte cannot be trusted, so decoding resumes at the next STX inside
/// the candidate, or after it when there is none. Bytes skipped this way are
/// never read as unframed ACK or NAK.
fn resync_offset(frame: &[u8], error: &ProtocolError) -> usize {
    if matches!(error, ProtocolError::CrcMismatch { .. }) {
        return frame.len();
    }
    frame[1..]
        .iter()
        .position(|&b| b == STX)
        .map_or(frame.len(), |pos| pos + 1)
}

/// `tokio_util` codec for the extended protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct SiCodec;

impl SiCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SiCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            let Some(&first) = src.first() else {
                return Ok(None);
            };

            match first {
                STX => {}
                WAKEUP => {
                    src.advance(1);
                    continue;
                }
                b if commands::is_unframed(b) => {
                    src.advance(1);
                    return Ok(Some(Message::new(b, Vec::new())));
                }
                b => {
                    trace!("Skipping stray byte {:#04x}", b);
                    src.advance(1);
                    continue;
                }
            }

            // Repeated STX before the command
            if src.len() >= 2 && src[1] == STX {
                src.advance(1);
                continue;
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            let total = HEADER_LEN + src[2] as usize + TRAILER_LEN;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            match decode_frame(&src[..total]) {
                Ok(message) => {
                    src.advance(total);
                    return Ok(Some(message));
                }
                Err(e) => {
                    warn!("Dropping invalid frame: {}", e);
                    let skip = resync_offset(&src[..total], &e);
                    src.advance(skip);
                }
            }
        }
    }
}

impl Encoder<Message> for SiCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if item.data().len() > MAX_DATA_LEN {
            return Err(ProtocolError::InvalidFrame(format!(
                "{} data bytes do not fit a frame",
                item.data().len()
            )));
        }
        let bytes = encode_frame(&item);
        dst.reserve(bytes.len());
        dst.put_slice(&bytes);
        Ok(())
    }
}

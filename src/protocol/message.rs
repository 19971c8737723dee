//! Peer wire message framing
//!
//! After the handshake every message is a 4-byte big-endian length followed
//! by a body whose first byte is the message ID. Only the extended message
//! carries anything we act on; the rest are recognised for logging.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Size of the length prefix in front of every message
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest message body we are willing to buffer.
///
/// A metadata piece message is a small dictionary plus at most one 16 KiB
/// piece, and nothing else we receive comes close to a megabyte.
pub const MAX_MESSAGE_LENGTH: usize = (1 << 20) + (1 << 14) + 64;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
    Extended = 20,
}

impl MessageId {
    /// Map a wire byte to a known message ID
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageId::Choke),
            1 => Some(MessageId::Unchoke),
            2 => Some(MessageId::Interested),
            3 => Some(MessageId::NotInterested),
            4 => Some(MessageId::Have),
            5 => Some(MessageId::Bitfield),
            6 => Some(MessageId::Request),
            7 => Some(MessageId::Piece),
            8 => Some(MessageId::Cancel),
            9 => Some(MessageId::Port),
            20 => Some(MessageId::Extended),
            _ => None,
        }
    }
}

/// Prefix `body` with its big-endian length
pub fn frame(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    trace!("Framed message: {} bytes", buf.len());
    buf.freeze()
}

/// Build a framed extended message: `[len][20][sub_id][payload]`
pub fn extended_frame(sub_id: u8, payload: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(2 + payload.len());
    body.put_u8(MessageId::Extended as u8);
    body.put_u8(sub_id);
    body.put_slice(payload);
    frame(&body)
}

/// Read the length prefix of a message
pub fn parse_length(prefix: &[u8]) -> Option<usize> {
    let bytes: [u8; LENGTH_PREFIX_SIZE] = prefix.try_into().ok()?;
    Some(u32::from_be_bytes(bytes) as usize)
}

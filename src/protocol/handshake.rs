//! BitTorrent handshake
//!
//! Builds our outbound handshake and parses the peer's reply.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Bytes following the protocol string: reserved (8) + info hash (20) + peer id (20)
pub const HANDSHAKE_TAIL_LENGTH: usize = 48;

/// Reserved bytes we advertise: extension protocol (byte 5, 0x10) and DHT (byte 7, 0x01)
pub const RESERVED: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x01];

/// Index and mask of the extension protocol bit in the reserved bytes
const EXTENSION_BYTE: usize = 5;
const EXTENSION_MASK: u8 = 0x10;

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier as sent on the wire
    pub protocol: Vec<u8>,
    /// Capability bitmap
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create our handshake, advertising extension protocol support
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating new handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            protocol: PROTOCOL_STRING.as_bytes().to_vec(),
            reserved: RESERVED,
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer ID with "-RM0001-" prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[0..8].copy_from_slice(b"-RM0001-");
        peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
        debug!("Generated new peer ID: {}", hex::encode(peer_id));
        peer_id
    }

    /// Whether the reserved bytes announce extension protocol support
    pub fn supports_extensions(&self) -> bool {
        self.reserved[EXTENSION_BYTE] & EXTENSION_MASK != 0
    }

    /// Serialize the handshake to bytes
    pub fn serialize(&self) -> Bytes {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(1 + self.protocol.len() + HANDSHAKE_TAIL_LENGTH);
        buf.put_u8(self.protocol.len() as u8);
        buf.put_slice(&self.protocol);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        trace!("Handshake serialized: {} bytes", buf.len());
        buf.freeze()
    }

    /// Parse the handshake body that follows the protocol length byte.
    ///
    /// `body` must be exactly `protocol_len + 48` bytes. The protocol string
    /// and the extension bit are both checked here.
    pub fn parse_body(protocol_len: usize, body: &[u8]) -> Result<Self, TorrentError> {
        trace!("Parsing handshake body of {} bytes", body.len());

        if body.len() != protocol_len + HANDSHAKE_TAIL_LENGTH {
            error!("Handshake body has wrong size: expected {}, got {}", protocol_len + HANDSHAKE_TAIL_LENGTH, body.len());
            return Err(TorrentError::protocol_error_with_source(
                "Handshake body has wrong size",
                format!("expected {}, got {}", protocol_len + HANDSHAKE_TAIL_LENGTH, body.len()),
            ));
        }

        let protocol = &body[..protocol_len];
        if protocol_len != PROTOCOL_LENGTH as usize || protocol != PROTOCOL_STRING.as_bytes() {
            warn!("Peer sent unexpected protocol string: {:?}", String::from_utf8_lossy(protocol));
            return Err(TorrentError::protocol_error_with_source(
                "Protocol string mismatch, this is not BitTorrent protocol",
                String::from_utf8_lossy(protocol).to_string(),
            ));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&body[protocol_len..protocol_len + 8]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&body[protocol_len + 8..protocol_len + 28]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&body[protocol_len + 28..protocol_len + 48]);

        let handshake = Self {
            protocol: protocol.to_vec(),
            reserved,
            info_hash,
            peer_id,
        };

        if !handshake.supports_extensions() {
            warn!("Peer does not support the extension protocol (reserved: {})", hex::encode(reserved));
            return Err(TorrentError::protocol_error_with_source(
                "Peer rejected: extension protocol not supported",
                format!("reserved bytes {}", hex::encode(reserved)),
            ));
        }

        info!("Peer handshake accepted, peer_id: {}", hex::encode(peer_id));
        Ok(handshake)
    }

    /// Check the echoed info hash against ours
    pub fn matches_info_hash(&self, expected_info_hash: &[u8; 20]) -> bool {
        if self.info_hash != *expected_info_hash {
            warn!("Handshake info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return false;
        }
        true
    }
}

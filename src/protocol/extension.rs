//! Extension protocol (BEP-10) and metadata exchange (BEP-9) payloads
//!
//! Outbound dictionaries are encoded with `serde_bencode`. Inbound ones are
//! decoded with the prefix decoder in [`super::bencode`] so that the raw
//! piece bytes trailing a metadata dictionary can be split off exactly.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace};

use super::bencode::{decode_dict_prefix, BencodeValue};
use super::message::extended_frame;
use crate::error::TorrentError;

/// Extended message sub-ID reserved for the extension handshake
pub const EXTENDED_HANDSHAKE_ID: u8 = 0;

/// Sub-ID we ask peers to use when sending us ut_metadata messages
pub const LOCAL_UT_METADATA_ID: u8 = 1;

/// Size of a metadata piece
pub const METADATA_PIECE_SIZE: usize = 16384;

/// Upper bound on the metadata size a peer may declare
pub const MAX_METADATA_SIZE: usize = 1 << 20;

/// ut_metadata message types
pub const MSG_TYPE_REQUEST: i64 = 0;
pub const MSG_TYPE_DATA: i64 = 1;
pub const MSG_TYPE_REJECT: i64 = 2;

#[derive(Serialize)]
struct OutboundHandshake {
    m: BTreeMap<String, i64>,
}

#[derive(Serialize)]
struct MetadataRequest {
    msg_type: i64,
    piece: i64,
}

/// Build our extension handshake: `{"m": {"ut_metadata": 1}}`
pub fn extended_handshake() -> Result<Bytes, TorrentError> {
    let mut m = BTreeMap::new();
    m.insert("ut_metadata".to_string(), LOCAL_UT_METADATA_ID as i64);
    let payload = serde_bencode::to_bytes(&OutboundHandshake { m })
        .map_err(|e| TorrentError::protocol_error_with_source("Failed to encode extension handshake", e.to_string()))?;
    trace!("Extension handshake payload: {} bytes", payload.len());
    Ok(extended_frame(EXTENDED_HANDSHAKE_ID, &payload))
}

/// Build a request for metadata piece `index`, addressed with the peer's ut_metadata ID
pub fn piece_request(peer_ut_metadata: u8, index: u32) -> Result<Bytes, TorrentError> {
    let payload = serde_bencode::to_bytes(&MetadataRequest {
        msg_type: MSG_TYPE_REQUEST,
        piece: index as i64,
    })
    .map_err(|e| TorrentError::protocol_error_with_source("Failed to encode metadata request", e.to_string()))?;
    Ok(extended_frame(peer_ut_metadata, &payload))
}

/// Number of 16 KiB pieces needed for `metadata_size` bytes
pub fn piece_count(metadata_size: usize) -> usize {
    metadata_size.div_ceil(METADATA_PIECE_SIZE)
}

/// The fields of a peer's extension handshake that matter to us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerExtensions {
    /// ID the peer wants ut_metadata messages sent with
    pub ut_metadata: Option<i64>,
    /// Declared size of the info dictionary
    pub metadata_size: Option<i64>,
    /// Client name and version (`v`)
    pub client: Option<String>,
}

impl PeerExtensions {
    /// Decode the bencoded extension handshake payload
    pub fn decode(payload: &[u8]) -> Result<Self, TorrentError> {
        let (dict, consumed) = decode_dict_prefix(payload)
            .map_err(|e| e.with_context("decoding extension handshake"))?;
        if consumed != payload.len() {
            debug!("Extension handshake has {} trailing bytes", payload.len() - consumed);
        }

        let ut_metadata = dict
            .get(b"m")
            .and_then(|m| m.get(b"ut_metadata"))
            .and_then(BencodeValue::as_int);
        let metadata_size = dict.get(b"metadata_size").and_then(BencodeValue::as_int);
        let client = dict
            .get(b"v")
            .and_then(BencodeValue::as_bytes)
            .map(|v| String::from_utf8_lossy(v).to_string());

        Ok(Self {
            ut_metadata,
            metadata_size,
            client,
        })
    }

    /// Check the negotiated values, returning the peer's ut_metadata ID and the metadata size
    pub fn validate(&self) -> Result<(u8, usize), TorrentError> {
        let ut_metadata = self
            .ut_metadata
            .ok_or_else(|| TorrentError::metadata_error("Peer does not advertise ut_metadata"))?;
        let size = self
            .metadata_size
            .ok_or_else(|| TorrentError::metadata_error("Peer did not declare metadata_size"))?;

        let id = u8::try_from(ut_metadata).ok().filter(|&id| id != 0);
        let size_ok = size > 0 && size as u64 <= MAX_METADATA_SIZE as u64;
        match (id, size_ok) {
            (Some(id), true) => Ok((id, size as usize)),
            _ => Err(TorrentError::metadata_error_with_source(
                "Extended handshake has invalid values",
                format!("metadata_size: {}, ut_metadata: {}", size, ut_metadata),
            )),
        }
    }
}

/// A ut_metadata message received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPiece {
    pub msg_type: i64,
    pub piece: Option<i64>,
    pub total_size: Option<i64>,
    /// Raw bytes following the dictionary
    pub data: Bytes,
}

impl MetadataPiece {
    /// Split the payload into its dictionary and the trailing piece bytes
    pub fn decode(payload: &[u8]) -> Result<Self, TorrentError> {
        let (dict, consumed) = decode_dict_prefix(payload)
            .map_err(|e| e.with_context("decoding metadata piece dictionary"))?;

        let msg_type = dict
            .get(b"msg_type")
            .and_then(BencodeValue::as_int)
            .ok_or_else(|| TorrentError::metadata_error("Metadata message without msg_type"))?;

        Ok(Self {
            msg_type,
            piece: dict.get(b"piece").and_then(BencodeValue::as_int),
            total_size: dict.get(b"total_size").and_then(BencodeValue::as_int),
            data: Bytes::copy_from_slice(&payload[consumed..]),
        })
    }
}

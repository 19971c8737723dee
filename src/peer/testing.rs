//! Encoders for the peer side of a metadata exchange, shared by the
//! state machine and connection tests.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::protocol::handshake::{Handshake, PROTOCOL_STRING, RESERVED};
use crate::protocol::message::{extended_frame, frame, MessageId};
use crate::protocol::METADATA_PIECE_SIZE;
use crate::torrent::info_hash_of;

pub const REMOTE_PEER_ID: [u8; 20] = *b"-MO0001-remotepeer01";

/// ut_metadata ID the scripted peer advertises
pub const REMOTE_UT_METADATA: u8 = 3;

pub fn peer_handshake(info_hash: [u8; 20]) -> Vec<u8> {
    Handshake::new(info_hash, REMOTE_PEER_ID).serialize().to_vec()
}

pub fn raw_handshake(protocol: &[u8], reserved: [u8; 8], info_hash: [u8; 20]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(protocol.len() as u8);
    buf.put_slice(protocol);
    buf.put_slice(&reserved);
    buf.put_slice(&info_hash);
    buf.put_slice(&REMOTE_PEER_ID);
    buf.to_vec()
}

pub fn handshake_without_extensions(info_hash: [u8; 20]) -> Vec<u8> {
    let mut reserved = RESERVED;
    reserved[5] = 0;
    raw_handshake(PROTOCOL_STRING.as_bytes(), reserved, info_hash)
}

pub fn extended_handshake(ut_metadata: i64, metadata_size: i64) -> Vec<u8> {
    let payload = format!(
        "d1:md11:ut_metadatai{}e6:ut_pexi2ee13:metadata_sizei{}e1:v12:MockPeer 1.0e",
        ut_metadata, metadata_size
    );
    extended_frame(0, payload.as_bytes()).to_vec()
}

pub fn piece_message(msg_type: i64, index: i64, total_size: usize, data: &[u8]) -> Vec<u8> {
    let mut payload = format!("d8:msg_typei{}e5:piecei{}e10:total_sizei{}ee", msg_type, index, total_size).into_bytes();
    payload.extend_from_slice(data);
    extended_frame(1, &payload).to_vec()
}

/// Data message for piece `index` of `metadata`
pub fn data_piece(metadata: &[u8], index: usize) -> Vec<u8> {
    let start = index * METADATA_PIECE_SIZE;
    let end = (start + METADATA_PIECE_SIZE).min(metadata.len());
    piece_message(1, index as i64, metadata.len(), &metadata[start..end])
}

pub fn bitfield_message() -> Vec<u8> {
    frame(&[MessageId::Bitfield as u8, 0xff, 0x80]).to_vec()
}

pub fn keepalive() -> Vec<u8> {
    vec![0, 0, 0, 0]
}

#[derive(Serialize)]
struct FixtureInfo {
    length: i64,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: i64,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
}

/// Single-file info dictionary whose encoding is exactly `encoded_len` bytes
/// and whose `length` field equals `encoded_len`.
pub fn fixture_metadata(encoded_len: usize) -> Vec<u8> {
    let encode = |padding: usize| {
        serde_bencode::to_bytes(&FixtureInfo {
            length: encoded_len as i64,
            name: "fixture.bin".to_string(),
            piece_length: 16384,
            pieces: vec![0x5a; padding],
        })
        .unwrap()
    };

    let overhead = encode(0).len();
    let start = encoded_len.saturating_sub(overhead + 8);
    (start..=encoded_len)
        .map(encode)
        .find(|data| data.len() == encoded_len)
        .expect("no padding produces the requested length")
}

/// Metadata fixture together with the info hash that matches it
pub fn fixture(encoded_len: usize) -> (Vec<u8>, [u8; 20]) {
    let metadata = fixture_metadata(encoded_len);
    let hash = info_hash_of(&metadata);
    (metadata, hash)
}

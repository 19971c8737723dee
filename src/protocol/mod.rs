//! BitTorrent protocol module
//!
//! Wire formats used while fetching metadata: the handshake, length-prefixed
//! messages, extension protocol payloads and the bencode they carry.

pub mod bencode;
pub mod extension;
pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use bencode::{decode_prefix, BencodeValue};
pub use extension::{MetadataPiece, PeerExtensions, MAX_METADATA_SIZE, METADATA_PIECE_SIZE};
pub use handshake::{Handshake, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{MessageId, MAX_MESSAGE_LENGTH};
pub use wire::{FrameHandler, StreamReassembler};

//! Metadata exchange state machine
//!
//! Each state names the frame it is waiting for and how many bytes that
//! frame occupies:
//!
//! ```text
//! HandshakeLength (1) -> HandshakeBody (len + 48) -> MessageLength (4) <-> MessageBody (n)
//! ```
//!
//! Handling a frame always installs the next state, so the byte stream is
//! self-describing. The machine performs no I/O; it returns [`Action`]s for
//! the connection driver to carry out, in order.

use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::event::LifecycleEvent;
use crate::protocol::extension::{
    self, MetadataPiece, PeerExtensions, EXTENDED_HANDSHAKE_ID, LOCAL_UT_METADATA_ID, MSG_TYPE_DATA,
    MSG_TYPE_REJECT,
};
use crate::protocol::handshake::{Handshake, HANDSHAKE_TAIL_LENGTH};
use crate::protocol::message::{parse_length, MessageId, LENGTH_PREFIX_SIZE, MAX_MESSAGE_LENGTH};
use crate::protocol::wire::{FrameHandler, StreamReassembler};
use crate::storage::{MetadataAssembler, PieceStatus};
use crate::torrent::{info_hash_of, MetadataResult};

/// The frame the machine is currently waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// One byte: length of the peer's protocol string
    HandshakeLength,
    /// Protocol string, reserved bytes, info hash and peer id
    HandshakeBody { protocol_len: usize },
    /// Four-byte big-endian message length
    MessageLength,
    /// Message body of the announced length
    MessageBody { length: usize },
    /// A terminal event was emitted; nothing more is read
    Finished,
}

impl FrameState {
    /// Bytes required before this state can make progress
    pub fn frame_size(&self) -> Option<usize> {
        match self {
            FrameState::HandshakeLength => Some(1),
            FrameState::HandshakeBody { protocol_len } => Some(protocol_len + HANDSHAKE_TAIL_LENGTH),
            FrameState::MessageLength => Some(LENGTH_PREFIX_SIZE),
            FrameState::MessageBody { length } => Some(*length),
            FrameState::Finished => None,
        }
    }
}

/// Work the driver must perform on behalf of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes to the peer
    Send(Bytes),
    /// Report an event
    Event(LifecycleEvent),
}

struct ProtocolHandler {
    info_hash: [u8; 20],
    verify_info_hash: bool,
    state: FrameState,
    peer_ut_metadata: Option<u8>,
    assembler: Option<MetadataAssembler>,
    actions: Vec<Action>,
}

impl FrameHandler for ProtocolHandler {
    fn demand(&self) -> Option<usize> {
        self.state.frame_size()
    }

    fn handle_frame(&mut self, frame: Bytes) {
        let result = match self.state {
            FrameState::HandshakeLength => {
                self.state = FrameState::HandshakeBody { protocol_len: frame[0] as usize };
                Ok(())
            }
            FrameState::HandshakeBody { protocol_len } => self.on_handshake(protocol_len, &frame),
            FrameState::MessageLength => self.on_message_length(&frame),
            FrameState::MessageBody { .. } => self.on_message_body(frame),
            FrameState::Finished => Ok(()),
        };

        if let Err(err) = result {
            self.fail(err);
        }
    }
}

impl ProtocolHandler {
    fn send(&mut self, data: Bytes) {
        self.actions.push(Action::Send(data));
    }

    fn emit(&mut self, event: LifecycleEvent) {
        self.actions.push(Action::Event(event));
    }

    fn fail(&mut self, err: TorrentError) {
        error!("Metadata exchange failed: {}", err);
        self.state = FrameState::Finished;
        self.assembler = None;
        self.emit(LifecycleEvent::Error(err));
    }

    fn on_handshake(&mut self, protocol_len: usize, body: &[u8]) -> Result<(), TorrentError> {
        let handshake = Handshake::parse_body(protocol_len, body)?;
        // Mismatch is only logged; the final SHA-1 check rejects wrong metadata
        handshake.matches_info_hash(&self.info_hash);

        self.emit(LifecycleEvent::HandshakeOk { peer_id: handshake.peer_id });
        self.state = FrameState::MessageLength;
        debug!("Sending extension handshake");
        self.send(extension::extended_handshake()?);
        Ok(())
    }

    fn on_message_length(&mut self, prefix: &[u8]) -> Result<(), TorrentError> {
        let length = parse_length(prefix)
            .ok_or_else(|| TorrentError::protocol_error("Truncated message length prefix"))?;

        if length == 0 {
            trace!("Received keep-alive");
            return Ok(());
        }
        if length > MAX_MESSAGE_LENGTH {
            return Err(TorrentError::protocol_error_with_source(
                "Message too long",
                format!("{} bytes (limit {})", length, MAX_MESSAGE_LENGTH),
            ));
        }

        self.state = FrameState::MessageBody { length };
        Ok(())
    }

    fn on_message_body(&mut self, body: Bytes) -> Result<(), TorrentError> {
        self.state = FrameState::MessageLength;

        match MessageId::from_byte(body[0]) {
            Some(MessageId::Extended) => {}
            Some(id) => {
                trace!("Ignoring {:?} message ({} bytes)", id, body.len());
                return Ok(());
            }
            None => {
                debug!("Ignoring unknown message id {}", body[0]);
                return Ok(());
            }
        }

        if body.len() < 2 {
            return Err(TorrentError::protocol_error("Extended message without sub-id"));
        }

        let payload = body.slice(2..);
        match body[1] {
            EXTENDED_HANDSHAKE_ID => self.on_extended_handshake(&payload),
            sub_id => {
                if sub_id != LOCAL_UT_METADATA_ID {
                    debug!("Extended message with sub-id {} treated as ut_metadata", sub_id);
                }
                self.on_metadata_message(&payload)
            }
        }
    }

    fn on_extended_handshake(&mut self, payload: &[u8]) -> Result<(), TorrentError> {
        if self.assembler.is_some() {
            debug!("Ignoring repeated extension handshake");
            return Ok(());
        }

        let extensions = PeerExtensions::decode(payload)?;
        if let Some(client) = &extensions.client {
            info!("Peer client: {}", client);
        }
        let (ut_metadata, metadata_size) = extensions.validate()?;

        let assembler = MetadataAssembler::new(metadata_size)?;
        let piece_count = assembler.piece_count();
        self.assembler = Some(assembler);
        self.peer_ut_metadata = Some(ut_metadata);

        info!(
            "Extension handshake done: metadata_size={}, pieces={}, ut_metadata={}",
            metadata_size, piece_count, ut_metadata
        );
        self.emit(LifecycleEvent::ExtendedOk { metadata_size, piece_count });

        for index in 0..piece_count {
            self.send(extension::piece_request(ut_metadata, index as u32)?);
        }
        debug!("Requested {} metadata pieces", piece_count);
        Ok(())
    }

    fn on_metadata_message(&mut self, payload: &[u8]) -> Result<(), TorrentError> {
        let assembler = self
            .assembler
            .as_mut()
            .ok_or_else(|| TorrentError::protocol_error("Metadata piece received before extension handshake"))?;

        let piece = MetadataPiece::decode(payload)?;
        match piece.msg_type {
            MSG_TYPE_DATA => {}
            MSG_TYPE_REJECT => {
                let index = piece.piece.map_or_else(|| "?".to_string(), |i| i.to_string());
                return Err(TorrentError::metadata_error(format!("Peer rejected piece {}", index)));
            }
            other => {
                return Err(TorrentError::metadata_error_with_source(
                    "Invalid msg_type",
                    other.to_string(),
                ));
            }
        }

        let raw_index = piece
            .piece
            .ok_or_else(|| TorrentError::metadata_error("Metadata message without piece index"))?;
        let index = usize::try_from(raw_index).map_err(|_| {
            TorrentError::metadata_error_with_source("Piece index out of range", raw_index.to_string())
        })?;

        if let Some(total_size) = piece.total_size {
            if total_size != assembler.metadata_size() as i64 {
                return Err(TorrentError::metadata_error_with_source(
                    "Piece total_size disagrees with metadata_size",
                    format!("total_size {}, metadata_size {}", total_size, assembler.metadata_size()),
                ));
            }
        }

        if assembler.insert(index, piece.data)? == PieceStatus::Replaced {
            warn!("Duplicate metadata piece {}, keeping the latest copy", index);
        }
        let received = assembler.received();
        let piece_count = assembler.piece_count();
        let complete = assembler.is_complete();

        debug!("Received metadata piece {} ({}/{})", index, received, piece_count);
        self.emit(LifecycleEvent::PieceReceived { index, received, piece_count });

        if complete {
            self.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TorrentError> {
        let data = self
            .assembler
            .take()
            .and_then(MetadataAssembler::assemble)
            .ok_or_else(|| TorrentError::metadata_error("Metadata table incomplete"))?;

        if self.verify_info_hash {
            let actual = info_hash_of(&data);
            if actual != self.info_hash {
                return Err(TorrentError::metadata_error_with_source(
                    "Metadata does not match info hash",
                    format!("expected {}, got {}", hex::encode(self.info_hash), hex::encode(actual)),
                ));
            }
        }

        let result = MetadataResult::from_bytes(self.info_hash, &data)?;
        self.state = FrameState::Finished;
        self.emit(LifecycleEvent::Done(Box::new(result)));
        Ok(())
    }
}

/// Synchronous engine for one metadata fetch attempt
pub struct MetadataMachine {
    reassembler: StreamReassembler,
    handler: ProtocolHandler,
    peer_id: [u8; 20],
}

impl MetadataMachine {
    /// Create a machine for `info_hash`, identifying ourselves as `peer_id`
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            reassembler: StreamReassembler::new(),
            handler: ProtocolHandler {
                info_hash,
                verify_info_hash: true,
                state: FrameState::HandshakeLength,
                peer_ut_metadata: None,
                assembler: None,
                actions: Vec::new(),
            },
            peer_id,
        }
    }

    /// Enable or disable the SHA-1 check of the assembled metadata
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.handler.verify_info_hash = verify;
        self
    }

    /// Our handshake, to be sent before any bytes are fed
    pub fn start(&self) -> Bytes {
        debug!("Starting metadata exchange for {}", hex::encode(self.handler.info_hash));
        Handshake::new(self.handler.info_hash, self.peer_id).serialize()
    }

    /// Feed bytes read from the peer, returning the resulting actions in order
    pub fn feed(&mut self, data: &[u8]) -> Vec<Action> {
        self.reassembler.feed(data, &mut self.handler);
        std::mem::take(&mut self.handler.actions)
    }

    /// The frame currently awaited
    pub fn state(&self) -> FrameState {
        self.handler.state
    }

    /// ut_metadata ID negotiated with the peer
    pub fn peer_ut_metadata(&self) -> Option<u8> {
        self.handler.peer_ut_metadata
    }

    /// Check if a terminal event has been emitted
    pub fn is_finished(&self) -> bool {
        self.handler.state == FrameState::Finished
    }
}

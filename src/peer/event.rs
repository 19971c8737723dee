//! Life-cycle events of a fetch attempt

use crate::error::TorrentError;
use crate::torrent::MetadataResult;

/// Progress reported by the protocol state machine.
///
/// Exactly one `Error` or `Done` ends an attempt; the other variants are
/// informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Error(TorrentError),
    HandshakeOk {
        peer_id: [u8; 20],
    },
    ExtendedOk {
        metadata_size: usize,
        piece_count: usize,
    },
    PieceReceived {
        index: usize,
        received: usize,
        piece_count: usize,
    },
    Done(Box<MetadataResult>),
}

impl LifecycleEvent {
    /// Check if this event ends the attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleEvent::Error(_) | LifecycleEvent::Done(_))
    }

    /// Convert a terminal event into the attempt's outcome
    pub fn into_outcome(self) -> Option<Result<MetadataResult, TorrentError>> {
        match self {
            LifecycleEvent::Error(err) => Some(Err(err)),
            LifecycleEvent::Done(result) => Some(Ok(*result)),
            _ => None,
        }
    }
}

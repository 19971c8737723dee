//! Metadata piece table
//!
//! Collects the 16 KiB pieces of an info dictionary, keyed by index, and
//! concatenates them once every index has been filled.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::TorrentError;
use crate::protocol::extension::{piece_count, MAX_METADATA_SIZE, METADATA_PIECE_SIZE};

/// What storing a piece did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceStatus {
    /// First data for this index
    Filled,
    /// Index already had data; it was overwritten
    Replaced,
}

/// Indexed table of received metadata pieces
#[derive(Debug)]
pub struct MetadataAssembler {
    metadata_size: usize,
    pieces: Vec<Option<Bytes>>,
    received: usize,
}

impl MetadataAssembler {
    /// Allocate a table for `metadata_size` bytes.
    ///
    /// The size must be in `(0, 1 MiB]`.
    pub fn new(metadata_size: usize) -> Result<Self, TorrentError> {
        if metadata_size == 0 || metadata_size > MAX_METADATA_SIZE {
            return Err(TorrentError::metadata_error_with_source(
                "Invalid metadata size",
                format!("{} bytes (limit {})", metadata_size, MAX_METADATA_SIZE),
            ));
        }

        let count = piece_count(metadata_size);
        debug!("Allocated metadata table: {} bytes in {} pieces", metadata_size, count);
        Ok(Self {
            metadata_size,
            pieces: vec![None; count],
            received: 0,
        })
    }

    /// Declared size of the metadata
    pub fn metadata_size(&self) -> usize {
        self.metadata_size
    }

    /// Number of pieces in the table
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Number of distinct indices filled so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Check if every index has data
    pub fn is_complete(&self) -> bool {
        self.received == self.pieces.len()
    }

    /// Expected length of piece `index`: 16 KiB, except the remainder in the last piece
    pub fn expected_piece_size(&self, index: usize) -> usize {
        let start = index * METADATA_PIECE_SIZE;
        self.metadata_size.saturating_sub(start).min(METADATA_PIECE_SIZE)
    }

    /// Store the data for piece `index`, overwriting any earlier copy
    pub fn insert(&mut self, index: usize, data: Bytes) -> Result<PieceStatus, TorrentError> {
        let count = self.pieces.len();
        if index >= count {
            return Err(TorrentError::metadata_error_with_source(
                "Piece index out of range",
                format!("index {} of {}", index, count),
            ));
        }

        let expected = self.expected_piece_size(index);
        if data.len() != expected {
            return Err(TorrentError::metadata_error_with_source(
                "Metadata piece has wrong length",
                format!("piece {}: expected {} bytes, got {}", index, expected, data.len()),
            ));
        }

        let slot = &mut self.pieces[index];

        trace!("Storing metadata piece {} ({} bytes)", index, data.len());
        let status = if slot.replace(data).is_some() {
            PieceStatus::Replaced
        } else {
            self.received += 1;
            PieceStatus::Filled
        };
        Ok(status)
    }

    /// Concatenate all pieces in index order, consuming the table.
    ///
    /// Returns `None` while any index is still missing or the total length is off.
    pub fn assemble(self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }

        let mut data = Vec::with_capacity(self.metadata_size);
        for piece in self.pieces.into_iter().flatten() {
            data.extend_from_slice(&piece);
        }
        if data.len() != self.metadata_size {
            debug!("Assembled {} bytes, expected {}", data.len(), self.metadata_size);
            return None;
        }
        debug!("Assembled {} bytes of metadata", data.len());
        Some(data)
    }
}

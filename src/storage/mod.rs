//! Storage module
//!
//! In-memory storage for metadata pieces while a fetch is in progress.

pub mod piece;

pub use piece::{MetadataAssembler, PieceStatus};

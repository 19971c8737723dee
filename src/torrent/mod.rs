//! Torrent metadata module
//!
//! The typed result of a metadata fetch and parsing of the fetch target.

pub mod info;
pub mod target;

pub use info::{info_hash_of, MetadataFile, MetadataResult};
pub use target::FetchTarget;

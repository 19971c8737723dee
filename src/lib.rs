//! peer-metadata-fetcher
//!
//! Fetches a torrent's info dictionary directly from a single peer using
//! the extension protocol and the ut_metadata exchange.

pub mod torrent;
pub mod protocol;
pub mod peer;
pub mod storage;
pub mod cli;
pub mod error;

pub use error::TorrentError;

pub use torrent::{info_hash_of, FetchTarget, MetadataFile, MetadataResult};
pub use protocol::{Handshake, MessageId, StreamReassembler};
pub use peer::{Action, LifecycleEvent, MetadataFetcher, MetadataMachine};
pub use storage::{MetadataAssembler, PieceStatus};
pub use cli::{CliArgs, FetchConfig, Report};

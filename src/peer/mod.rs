//! Peer module
//!
//! The metadata exchange with a single peer: the protocol state machine,
//! its life-cycle events, and the connection driver that runs it.

pub mod connection;
pub mod event;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use connection::MetadataFetcher;
pub use event::LifecycleEvent;
pub use state::{Action, FrameState, MetadataMachine};

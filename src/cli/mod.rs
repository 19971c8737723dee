//! CLI module
//!
//! Command-line interface for the metadata fetcher.

pub mod args;
pub mod config;
pub mod report;

pub use args::CliArgs;
pub use config::FetchConfig;
pub use report::{format_bytes, Report};

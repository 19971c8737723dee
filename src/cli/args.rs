//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;

/// CLI arguments for the metadata fetcher
#[derive(Debug, Parser)]
#[command(name = "peer-metadata-fetcher")]
#[command(about = "Fetch a torrent's info dictionary from a single peer", long_about = None)]
pub struct CliArgs {
    /// 40-character hex info hash or magnet link
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Peer address (host:port)
    #[arg(value_name = "PEER_ADDR")]
    pub peer: String,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 2.0)]
    pub connect_timeout: f64,

    /// Maximum seconds without data from the peer
    #[arg(long, value_name = "SECS", default_value_t = 30.0)]
    pub idle_timeout: f64,

    /// Overall timeout for the fetch in seconds
    #[arg(short, long, value_name = "SECS", default_value_t = 60.0)]
    pub timeout: f64,

    /// Skip the SHA-1 check of the received metadata
    #[arg(long)]
    pub no_verify: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_default_values() {
        let args = CliArgs::try_parse_from(["peer-metadata-fetcher", HASH, "10.0.0.1:6881"]).unwrap();

        assert_eq!(args.target, HASH);
        assert_eq!(args.peer, "10.0.0.1:6881");
        assert_eq!(args.connect_timeout, 2.0);
        assert_eq!(args.idle_timeout, 30.0);
        assert_eq!(args.timeout, 60.0);
        assert!(!args.no_verify);
        assert!(!args.json);
        assert_eq!(args.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_flags() {
        let args = CliArgs::try_parse_from([
            "peer-metadata-fetcher",
            HASH,
            "localhost:51413",
            "--connect-timeout",
            "0.5",
            "--timeout",
            "15",
            "--no-verify",
            "--json",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.connect_timeout, 0.5);
        assert_eq!(args.timeout, 15.0);
        assert!(args.no_verify);
        assert!(args.json);
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(CliArgs::try_parse_from(["peer-metadata-fetcher", HASH, "a:1", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_missing_peer() {
        assert!(CliArgs::try_parse_from(["peer-metadata-fetcher", HASH]).is_err());
    }
}

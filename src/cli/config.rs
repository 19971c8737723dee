//! Fetch configuration
//!
//! Timeouts and verification settings for a single metadata fetch attempt.

use crate::cli::args::CliArgs;
use crate::error::TorrentError;
use crate::protocol::Handshake;
use std::time::Duration;

/// Default bound on establishing the TCP connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default maximum time without inbound bytes
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling on a whole attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Bound on the TCP dial
    pub connect_timeout: Duration,
    /// Maximum time between inbound reads once connected
    pub idle_timeout: Duration,
    /// Wall-clock ceiling for the whole attempt
    pub attempt_timeout: Duration,
    /// Check the SHA-1 of the assembled metadata against the info hash
    pub verify_info_hash: bool,
    /// Local peer id; generated per attempt when unset
    pub peer_id: Option<[u8; 20]>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            verify_info_hash: true,
            peer_id: None,
        }
    }
}

impl FetchConfig {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            connect_timeout: seconds(args.connect_timeout),
            idle_timeout: seconds(args.idle_timeout),
            attempt_timeout: seconds(args.timeout),
            verify_info_hash: !args.no_verify,
            peer_id: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_info_hash = verify;
        self
    }

    pub fn with_peer_id(mut self, peer_id: [u8; 20]) -> Self {
        self.peer_id = Some(peer_id);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TorrentError> {
        let durations = [
            ("connect_timeout", self.connect_timeout),
            ("idle_timeout", self.idle_timeout),
            ("attempt_timeout", self.attempt_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(TorrentError::config_error_with_field("Timeout must be greater than zero", field));
            }
        }

        if self.idle_timeout > self.attempt_timeout {
            return Err(TorrentError::config_error_with_field(
                format!(
                    "idle_timeout ({:?}) cannot exceed attempt_timeout ({:?})",
                    self.idle_timeout, self.attempt_timeout
                ),
                "idle_timeout",
            ));
        }

        Ok(())
    }

    /// The configured peer id, or a freshly generated one
    pub fn resolve_peer_id(&self) -> [u8; 20] {
        self.peer_id.unwrap_or_else(Handshake::generate_peer_id)
    }
}

// Negative or non-finite values become zero and fail validation
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

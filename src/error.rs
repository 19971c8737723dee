//! Error types for the metadata fetcher
//!
//! Every failure of a fetch attempt is reported through [`TorrentError`].
//! The variants follow the kinds of failure a single attempt can hit:
//! the connection, the wire protocol, bencode decoding, and the metadata
//! exchange rules themselves.

use std::fmt;

/// Comprehensive error type for metadata fetch operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentError {
    /// Dial, read, write and timeout failures
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Peer speaks something other than what we expect on the wire
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Malformed bencoded payload
    DecodeError {
        message: String,
        source: Option<String>,
    },

    /// Payload parsed but violates the metadata exchange rules
    MetadataError {
        message: String,
        source: Option<String>,
    },

    /// Peer connection errors
    PeerError {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Validation errors for user supplied input
    ValidationError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new DecodeError
    pub fn decode_error(message: impl Into<String>) -> Self {
        TorrentError::DecodeError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new DecodeError with source
    pub fn decode_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::DecodeError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new MetadataError
    pub fn metadata_error(message: impl Into<String>) -> Self {
        TorrentError::MetadataError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new MetadataError with source
    pub fn metadata_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::MetadataError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new PeerError with peer and source
    pub fn peer_error_full(message: impl Into<String>, peer: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::PeerError {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ValidationError with field
    pub fn validation_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TorrentError::NetworkError { source, .. }
            | TorrentError::ProtocolError { source, .. }
            | TorrentError::DecodeError { source, .. }
            | TorrentError::MetadataError { source, .. }
            | TorrentError::PeerError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }

    /// Whether the failure came from the transport rather than the peer's payload
    pub fn is_network(&self) -> bool {
        matches!(self, TorrentError::NetworkError { .. } | TorrentError::PeerError { .. })
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            TorrentError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            TorrentError::DecodeError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Decode error: {} (source: {})", message, src)
                } else {
                    write!(f, "Decode error: {}", message)
                }
            }
            TorrentError::MetadataError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Metadata error: {} (source: {})", message, src)
                } else {
                    write!(f, "Metadata error: {}", message)
                }
            }
            TorrentError::PeerError { message, peer, source } => {
                match (peer, source) {
                    (Some(p), Some(s)) => write!(f, "Peer error: {} (peer: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Peer error: {} (peer: {})", message, p),
                    (None, Some(s)) => write!(f, "Peer error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Peer error: {}", message),
                }
            }
            TorrentError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            TorrentError::ValidationError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Validation error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Validation error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::NetworkError {
            message: err.to_string(),
            address: None,
            source: Some(err.kind().to_string()),
        }
    }
}

// serde_bencode::Error is the public type for both encode and decode failures
impl From<serde_bencode::Error> for TorrentError {
    fn from(err: serde_bencode::Error) -> Self {
        TorrentError::decode_error_with_source("Bencode error", err.to_string())
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::validation_error_with_field(format!("Failed to parse address: {}", err), "peer")
    }
}

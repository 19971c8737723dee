//! Fetch target parsing
//!
//! Accepts either a bare 40-character hex info hash or a magnet link and
//! extracts the info hash (plus the display name, if the magnet has one).

use tracing::{debug, warn};
use url::Url;

use crate::error::TorrentError;

/// Info hash to fetch metadata for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// SHA1 info hash
    pub info_hash: [u8; 20],
    /// Display name (dn parameter of a magnet link)
    pub display_name: Option<String>,
}

impl FetchTarget {
    /// Parse a hex info hash or a magnet link
    ///
    /// # Example
    /// ```ignore
    /// let target = FetchTarget::parse("magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Big+Buck+Bunny")?;
    /// ```
    pub fn parse(input: &str) -> Result<Self, TorrentError> {
        let input = input.trim();
        if Self::is_magnet_link(input) {
            return Self::parse_magnet(input);
        }

        Ok(Self {
            info_hash: Self::parse_hex_hash(input)?,
            display_name: None,
        })
    }

    fn parse_magnet(magnet_uri: &str) -> Result<Self, TorrentError> {
        let url = Url::parse(magnet_uri).map_err(|e| {
            warn!("Invalid magnet URL format: {}", e);
            TorrentError::validation_error_with_field(format!("Invalid magnet URL format: {}", e), "target")
        })?;

        let mut info_hash = None;
        let mut display_name = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    if let Some(hash) = value.strip_prefix("urn:btih:") {
                        info_hash = Some(Self::parse_hex_hash(hash)?);
                    } else {
                        debug!("Ignoring non-BitTorrent xt parameter: {}", value);
                    }
                }
                "dn" => display_name = Some(value.into_owned()),
                _ => debug!("Ignoring magnet parameter: {}", key),
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            TorrentError::validation_error_with_field(
                "Magnet link must contain an info hash (xt=urn:btih:<hash>)",
                "target",
            )
        })?;

        Ok(Self {
            info_hash,
            display_name,
        })
    }

    fn parse_hex_hash(hash_str: &str) -> Result<[u8; 20], TorrentError> {
        if hash_str.len() == 32 {
            return Err(TorrentError::validation_error_with_field(
                "Base32-encoded info hashes are not supported, use the 40-character hex form",
                "target",
            ));
        }

        let bytes = hex::decode(hash_str).map_err(|e| {
            TorrentError::validation_error_with_field(format!("Info hash is not valid hex: {}", e), "target")
        })?;

        bytes.try_into().map_err(|bytes: Vec<u8>| {
            TorrentError::validation_error_with_field(
                format!("Info hash has {} bytes, expected 20", bytes.len()),
                "target",
            )
        })
    }

    /// Check if a string looks like a magnet link
    pub fn is_magnet_link(input: &str) -> bool {
        input.trim().starts_with("magnet:?")
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

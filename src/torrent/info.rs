//! Fetched metadata
//!
//! Typed view of an info dictionary as received through the metadata
//! exchange.

use serde::{Deserialize, Serialize, Serializer};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::error::TorrentError;

/// A file entry of a multi-file torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataFile {
    /// File path components (e.g., ["folder", "subfolder", "file.txt"])
    pub path: Vec<String>,
    /// File size in bytes
    pub length: u64,
}

impl MetadataFile {
    /// Path components joined with `/`
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}

/// Outcome of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataResult {
    /// Info hash the metadata was requested for
    #[serde(serialize_with = "serialize_hex")]
    pub info_hash: [u8; 20],
    /// Torrent name
    pub name: String,
    /// Single file size (None for multi-file torrents)
    pub length: Option<u64>,
    /// Size of each content piece
    pub piece_length: Option<u64>,
    /// Files in multi-file torrents (empty for single-file torrents)
    pub files: Vec<MetadataFile>,
    /// Raw `pieces` field: concatenated 20-byte SHA-1 hashes
    #[serde(skip)]
    pub pieces: Vec<u8>,
}

#[derive(Deserialize)]
struct RawInfo {
    #[serde(with = "serde_bytes")]
    name: Vec<u8>,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(rename = "piece length", default)]
    piece_length: Option<i64>,
    #[serde(default)]
    pieces: Option<ByteBuf>,
}

#[derive(Deserialize)]
struct RawFile {
    length: i64,
    path: Vec<ByteBuf>,
}

fn serialize_hex<S: Serializer>(hash: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(hash))
}

fn non_negative(value: i64, field: &str) -> Result<u64, TorrentError> {
    u64::try_from(value).map_err(|_| {
        TorrentError::metadata_error_with_source(format!("Negative {} in info dictionary", field), value.to_string())
    })
}

impl MetadataResult {
    /// Decode an assembled info dictionary
    pub fn from_bytes(info_hash: [u8; 20], data: &[u8]) -> Result<Self, TorrentError> {
        debug!("Decoding {} bytes of metadata", data.len());

        let raw: RawInfo = serde_bencode::from_bytes(data)
            .map_err(|e| TorrentError::decode_error_with_source("Failed to decode metadata", e.to_string()))?;

        let length = raw.length.map(|l| non_negative(l, "length")).transpose()?;
        let piece_length = raw.piece_length.map(|l| non_negative(l, "piece length")).transpose()?;

        let mut files = Vec::new();
        for file in raw.files.unwrap_or_default() {
            files.push(MetadataFile {
                path: file
                    .path
                    .iter()
                    .map(|component| String::from_utf8_lossy(component).to_string())
                    .collect(),
                length: non_negative(file.length, "file length")?,
            });
        }

        if length.is_none() && files.is_empty() {
            return Err(TorrentError::metadata_error("Neither length nor files found in info dictionary"));
        }

        let result = Self {
            info_hash,
            name: String::from_utf8_lossy(&raw.name).to_string(),
            length,
            piece_length,
            files,
            pieces: raw.pieces.map(ByteBuf::into_vec).unwrap_or_default(),
        };

        info!(
            "Decoded metadata for '{}': {} bytes in {} file(s)",
            result.name,
            result.total_size(),
            result.file_count()
        );
        Ok(result)
    }

    /// Calculate total size of all files
    pub fn total_size(&self) -> u64 {
        match self.length {
            Some(length) => length,
            None => self.files.iter().map(|f| f.length).sum(),
        }
    }

    /// Check if this is a multi-file torrent
    pub fn is_multi_file(&self) -> bool {
        self.length.is_none()
    }

    /// Number of files, counting a single-file torrent as one
    pub fn file_count(&self) -> usize {
        if self.is_multi_file() {
            self.files.len()
        } else {
            1
        }
    }

    /// Iterate over files, presenting a single-file torrent as one entry named after the torrent
    pub fn files_iter(&self) -> Box<dyn Iterator<Item = MetadataFile> + '_> {
        match self.length {
            Some(length) => Box::new(std::iter::once(MetadataFile {
                path: vec![self.name.clone()],
                length,
            })),
            None => Box::new(self.files.iter().cloned()),
        }
    }

    /// Number of content pieces described by the `pieces` field
    pub fn piece_count(&self) -> usize {
        self.pieces.len() / 20
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

/// SHA-1 of a bencoded info dictionary
pub fn info_hash_of(info_dict_bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(info_dict_bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct FixtureFile {
        length: i64,
        path: Vec<String>,
    }

    #[derive(Serialize)]
    struct MultiFileFixture {
        files: Vec<FixtureFile>,
        name: String,
        #[serde(rename = "piece length")]
        piece_length: i64,
        #[serde(with = "serde_bytes")]
        pieces: Vec<u8>,
    }

    #[test]
    fn test_decode_single_file() {
        let data = b"d6:lengthi1024e4:name8:test.txt12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";
        let result = MetadataResult::from_bytes([7u8; 20], data).unwrap();

        assert_eq!(result.name, "test.txt");
        assert_eq!(result.length, Some(1024));
        assert_eq!(result.total_size(), 1024);
        assert_eq!(result.piece_length, Some(16384));
        assert_eq!(result.pieces, vec![b'a'; 20]);
        assert_eq!(result.piece_count(), 1);
        assert!(!result.is_multi_file());
        assert_eq!(result.info_hash, [7u8; 20]);

        let files: Vec<_> = result.files_iter().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, vec!["test.txt".to_string()]);
    }

    #[test]
    fn test_decode_multi_file() {
        let fixture = MultiFileFixture {
            files: vec![
                FixtureFile { length: 100, path: vec!["dir".into(), "a.bin".into()] },
                FixtureFile { length: 250, path: vec!["b.txt".into()] },
            ],
            name: "bundle".into(),
            piece_length: 262144,
            pieces: vec![0u8; 20],
        };
        let data = serde_bencode::to_bytes(&fixture).unwrap();
        let result = MetadataResult::from_bytes([1u8; 20], &data).unwrap();

        assert_eq!(result.name, "bundle");
        assert!(result.is_multi_file());
        assert_eq!(result.total_size(), 350);
        assert_eq!(result.file_count(), 2);
        assert_eq!(result.files[0].display_path(), "dir/a.bin");
        assert_eq!(result.files[1].length, 250);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let data = b"d6:lengthi5e3:md532:0123456789abcdef0123456789abcdef4:name1:x7:privatei1ee";
        let result = MetadataResult::from_bytes([0u8; 20], data).unwrap();
        assert_eq!(result.length, Some(5));
    }

    #[test]
    fn test_missing_length_and_files() {
        let data = b"d4:name1:xe";
        assert!(MetadataResult::from_bytes([0u8; 20], data).is_err());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = MetadataResult::from_bytes([0u8; 20], b"not bencode").unwrap_err();
        assert!(matches!(err, TorrentError::DecodeError { .. }));
    }

    #[test]
    fn test_json_output_uses_hex_hash() {
        let data = b"d6:lengthi1e4:name1:xe";
        let result = MetadataResult::from_bytes([0xab; 20], data).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["info_hash"], "abababababababababababababababababababab");
        assert_eq!(json["name"], "x");
        assert!(json.get("pieces").is_none());
    }

    #[test]
    fn test_info_hash_of() {
        let mut dict = BTreeMap::new();
        dict.insert("name".to_string(), "x".to_string());
        let data = serde_bencode::to_bytes(&dict).unwrap();
        assert_eq!(hex::encode(info_hash_of(&data)).len(), 40);
        assert_eq!(info_hash_of(&data), info_hash_of(b"d4:name1:xe"));
    }
}

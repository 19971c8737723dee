//! Generic bencode decoding
//!
//! Decodes a single bencoded value from the front of a byte slice and
//! reports how many bytes it consumed. Metadata piece messages append raw
//! bytes directly after their dictionary, so the consumed length is what
//! tells the two apart.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::TorrentError;

/// Nesting limit for lists and dictionaries
const MAX_DEPTH: usize = 64;

/// A decoded bencode value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }
}

/// Decode one value from the start of `data`.
///
/// Returns the value and the number of bytes it occupied; anything after
/// that offset is left untouched.
pub fn decode_prefix(data: &[u8]) -> Result<(BencodeValue, usize), TorrentError> {
    let mut idx = 0;
    let value = parse_value(data, &mut idx, 0)?;
    trace!("Decoded bencode value spanning {}/{} bytes", idx, data.len());
    Ok((value, idx))
}

/// Decode a value that must be a dictionary, returning it with its length
pub fn decode_dict_prefix(data: &[u8]) -> Result<(BencodeValue, usize), TorrentError> {
    let (value, consumed) = decode_prefix(data)?;
    if value.as_dict().is_none() {
        return Err(TorrentError::decode_error("Expected a bencoded dictionary"));
    }
    Ok((value, consumed))
}

fn parse_value(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue, TorrentError> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::decode_error("Bencode nesting too deep"));
    }

    let byte = *data
        .get(*idx)
        .ok_or_else(|| TorrentError::decode_error("Unexpected end of data"))?;

    match byte {
        b'i' => {
            *idx += 1;
            let end = find(data, *idx, b'e')
                .ok_or_else(|| TorrentError::decode_error("Unterminated integer"))?;
            let value = parse_number::<i64>(&data[*idx..end], "integer")?;
            *idx = end + 1;
            Ok(BencodeValue::Int(value))
        }
        b'l' => {
            *idx += 1;
            let mut list = Vec::new();
            loop {
                match data.get(*idx) {
                    Some(b'e') => break,
                    Some(_) => list.push(parse_value(data, idx, depth + 1)?),
                    None => return Err(TorrentError::decode_error("Unterminated list")),
                }
            }
            *idx += 1;
            Ok(BencodeValue::List(list))
        }
        b'd' => {
            *idx += 1;
            let mut dict = BTreeMap::new();
            loop {
                match data.get(*idx) {
                    Some(b'e') => break,
                    Some(_) => {
                        let key = match parse_value(data, idx, depth + 1)? {
                            BencodeValue::Bytes(b) => b,
                            _ => return Err(TorrentError::decode_error("Dictionary key must be a byte string")),
                        };
                        let value = parse_value(data, idx, depth + 1)?;
                        dict.insert(key, value);
                    }
                    None => return Err(TorrentError::decode_error("Unterminated dictionary")),
                }
            }
            *idx += 1;
            Ok(BencodeValue::Dict(dict))
        }
        b'0'..=b'9' => {
            let colon = find(data, *idx, b':')
                .ok_or_else(|| TorrentError::decode_error("Unterminated string length"))?;
            let length = parse_number::<usize>(&data[*idx..colon], "string length")?;
            let start = colon + 1;
            let end = start
                .checked_add(length)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    TorrentError::decode_error_with_source(
                        "String runs past end of data",
                        format!("declared {} bytes, {} available", length, data.len().saturating_sub(start)),
                    )
                })?;
            *idx = end;
            Ok(BencodeValue::Bytes(data[start..end].to_vec()))
        }
        _ => Err(TorrentError::decode_error_with_source(
            "Unknown bencode type",
            format!("byte 0x{:02x} at offset {}", byte, *idx),
        )),
    }
}

fn find(data: &[u8], from: usize, needle: u8) -> Option<usize> {
    data[from..].iter().position(|&b| b == needle).map(|p| p + from)
}

fn parse_number<T: std::str::FromStr>(digits: &[u8], what: &str) -> Result<T, TorrentError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .ok_or_else(|| {
            TorrentError::decode_error_with_source(
                format!("Invalid {}", what),
                String::from_utf8_lossy(digits).to_string(),
            )
        })
}

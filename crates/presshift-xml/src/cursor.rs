//! Opaque cursor encoding.
//!
//! Bookmarks travel between processes as base64-encoded JSON. The encoding
//! is shared by the XML processor and the WXR entity reader on top of it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{XmlError, XmlResult};

/// Serialize a cursor payload as base64 JSON.
pub fn encode_cursor<T: Serialize>(value: &T) -> XmlResult<String> {
    let json = serde_json::to_vec(value)
        .map_err(|err| XmlError::InvalidCursor(err.to_string()))?;
    Ok(BASE64.encode(json))
}

/// Decode a cursor previously produced by [`encode_cursor`].
pub fn decode_cursor<T: DeserializeOwned>(cursor: &str) -> XmlResult<T> {
    let json = BASE64
        .decode(cursor.trim())
        .map_err(|err| XmlError::InvalidCursor(err.to_string()))?;
    serde_json::from_slice(&json).map_err(|err| XmlError::InvalidCursor(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let payload = vec![("a".to_string(), 1u64), ("b".to_string(), 2u64)];
        let cursor = encode_cursor(&payload).unwrap();
        assert!(!cursor.contains('{'));
        let decoded: Vec<(String, u64)> = decode_cursor(&cursor).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_cursor::<Vec<u8>>("!!!not-base64!!!").is_err());
        let valid_b64_bad_json = BASE64.encode(b"not json");
        assert!(decode_cursor::<Vec<u8>>(&valid_b64_bad_json).is_err());
    }
}

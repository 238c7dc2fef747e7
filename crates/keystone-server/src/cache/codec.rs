//! Value encoding for cached responses.
//!
//! Record-shaped values (anything that serializes to a JSON object) are
//! stored as JSON. Everything else is stored as MessagePack behind a one byte
//! marker. Decoding tries JSON first and falls back to MessagePack.

use serde::{Serialize, de::DeserializeOwned};

/// Never a valid first byte of a JSON document, and never used by MessagePack.
const OPAQUE_MARKER: u8 = 0xC1;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode cache value: {0}")]
    Encode(String),

    #[error("failed to decode cache value: {0}")]
    Decode(String),
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    if let Ok(json) = serde_json::to_value(value)
        && json.is_object()
    {
        return serde_json::to_vec(&json).map_err(|e| CodecError::Encode(e.to_string()));
    }

    let mut bytes = vec![OPAQUE_MARKER];
    rmp_serde::encode::write_named(&mut bytes, value)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    if let Ok(value) = serde_json::from_slice(bytes) {
        return Ok(value);
    }
    let opaque = bytes.strip_prefix(&[OPAQUE_MARKER]).unwrap_or(bytes);
    rmp_serde::from_slice(opaque).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Me {
        user_id: i64,
        scopes: Vec<String>,
    }

    #[test]
    fn test_records_are_json() {
        let me = Me {
            user_id: 7,
            scopes: vec!["read".into()],
        };
        let bytes = encode(&me).unwrap();
        assert_eq!(bytes[0], b'{');
        assert_eq!(decode::<Me>(&bytes).unwrap(), me);
    }

    #[test]
    fn test_non_records_are_opaque() {
        let bytes = encode(&vec![1u32, 2, 3]).unwrap();
        assert_eq!(bytes[0], OPAQUE_MARKER);
        assert_eq!(decode::<Vec<u32>>(&bytes).unwrap(), vec![1, 2, 3]);

        // A small integer is a MessagePack fixint that looks like a JSON digit
        // once the marker is gone.
        let bytes = encode(&53u8).unwrap();
        assert_eq!(&bytes[1..], b"5");
        assert_eq!(decode::<u8>(&bytes).unwrap(), 53);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(matches!(
            decode::<Me>(&[OPAQUE_MARKER, 0xFF, 0x00]),
            Err(CodecError::Decode(_))
        ));
    }
}

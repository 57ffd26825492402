//! # JSON Helpers
//!
//! Decoding uses simd-json, encoding uses serde_json.
//! Used by the filter cache to persist resolved filter lists.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse JSON bytes into a typed value.
///
/// simd-json parses in place, so the input is copied first.
///
/// # Errors
///
/// Returns `Error::FilterResolution` if the bytes are not valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut buf = bytes.to_vec();
    simd_json::from_slice(&mut buf).map_err(|e| Error::FilterResolution {
        reason: format!("malformed JSON: {e}"),
    })
}

/// Serialize a value to JSON bytes
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_filter_list() {
        let filters = vec!["auth".to_string(), "csrf:strict".to_string()];
        let bytes = to_json(&filters).unwrap();
        let parsed: Vec<String> = parse_json(&bytes).unwrap();
        assert_eq!(parsed, filters);
    }

    #[test]
    fn test_invalid_json() {
        let result: Result<Vec<String>> = parse_json(b"not valid json");
        assert!(matches!(result, Err(Error::FilterResolution { .. })));
    }

    #[test]
    fn test_wrong_shape() {
        let result: Result<Vec<String>> = parse_json(br#"{"filters": 3}"#);
        assert!(result.is_err());
    }
}

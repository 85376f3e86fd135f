//! Call metadata: the string-to-bytes mapping attached to RPC calls.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Suffix marking a metadata key whose value is binary.
const BIN_SUFFIX: &str = "-bin";

/// Error returned when a metadata key or value is invalid.
#[derive(Clone, Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid metadata key: {0:?}")]
    InvalidKey(String),

    #[error("invalid metadata value for key {0:?}")]
    InvalidValue(String),

    /// Binary values require a `-bin` key; ASCII values must not use one.
    #[error("key {0:?} does not match value kind (binary values need a -bin key)")]
    KeyKindMismatch(String),
}

/// Metadata attached to an RPC call.
///
/// Keys are lowercase ASCII. Values under keys ending in `-bin` are binary
/// and transported base64-encoded; all other values are ASCII strings.
///
/// # Example
///
/// ```
/// use plexrpc_core::Metadata;
///
/// let mut metadata = Metadata::new();
/// metadata.insert("x-request-id", "abc-123").unwrap();
/// metadata.insert_bin("x-token-bin", b"\x00\x01\x02").unwrap();
///
/// assert_eq!(metadata.get("x-request-id"), Some("abc-123"));
/// assert_eq!(metadata.get_bin("x-token-bin").unwrap(), vec![0, 1, 2]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata from pre-built HTTP-style headers.
    pub fn from_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Insert an ASCII value.
    ///
    /// Fails if the key ends in `-bin` or if the key or value is not valid
    /// header material.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), MetadataError> {
        if key.ends_with(BIN_SUFFIX) {
            return Err(MetadataError::KeyKindMismatch(key.to_owned()));
        }
        let name = parse_key(key)?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| MetadataError::InvalidValue(key.to_owned()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Insert a binary value under a `-bin` key.
    pub fn insert_bin(&mut self, key: &str, value: &[u8]) -> Result<(), MetadataError> {
        if !key.ends_with(BIN_SUFFIX) {
            return Err(MetadataError::KeyKindMismatch(key.to_owned()));
        }
        let name = parse_key(key)?;
        let encoded = STANDARD_NO_PAD.encode(value);
        let value = HeaderValue::from_str(&encoded)
            .map_err(|_| MetadataError::InvalidValue(key.to_owned()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Get an ASCII value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Get and decode a binary value by its `-bin` key.
    pub fn get_bin(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.headers.get(key)?;
        STANDARD_NO_PAD.decode(value.as_bytes()).ok()
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Copy all entries from `other`, overwriting duplicates.
    pub fn merge(&mut self, other: &Metadata) {
        for (name, value) in other.headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over raw entries as they would appear on the wire.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    /// Borrow the underlying header map.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn parse_key(key: &str) -> Result<HeaderName, MetadataError> {
    if key.is_empty() || key.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(MetadataError::InvalidKey(key.to_owned()));
    }
    HeaderName::from_bytes(key.as_bytes()).map_err(|_| MetadataError::InvalidKey(key.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_ascii_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("x-client", "engine").unwrap();
        assert_eq!(metadata.get("x-client"), Some("engine"));
        assert!(metadata.contains("x-client"));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_metadata_binary_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert_bin("x-trace-bin", &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(
            metadata.get_bin("x-trace-bin").unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
        // The wire value is base64, not raw bytes.
        assert!(metadata.get("x-trace-bin").unwrap().is_ascii());
    }

    #[test]
    fn test_metadata_key_kind_mismatch() {
        let mut metadata = Metadata::new();
        assert!(matches!(
            metadata.insert("x-token-bin", "oops"),
            Err(MetadataError::KeyKindMismatch(_))
        ));
        assert!(matches!(
            metadata.insert_bin("x-token", b"oops"),
            Err(MetadataError::KeyKindMismatch(_))
        ));
    }

    #[test]
    fn test_metadata_rejects_uppercase_key() {
        let mut metadata = Metadata::new();
        assert!(matches!(
            metadata.insert("X-Client", "engine"),
            Err(MetadataError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_metadata_merge_overwrites() {
        let mut base = Metadata::new();
        base.insert("x-a", "1").unwrap();
        base.insert("x-b", "2").unwrap();

        let mut overlay = Metadata::new();
        overlay.insert("x-b", "3").unwrap();

        base.merge(&overlay);
        assert_eq!(base.get("x-a"), Some("1"));
        assert_eq!(base.get("x-b"), Some("3"));
    }
}

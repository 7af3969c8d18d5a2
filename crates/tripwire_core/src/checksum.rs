//! Packet integrity checksums.
//!
//! A checksum is the first 8 hex characters of the BLAKE3 hash of
//! `tool_type:action:item_type:<payload>` where the payload is rendered as
//! compact JSON with object keys sorted recursively.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Checksum-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    /// Wrong length
    #[error("checksum must be {expected} characters, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },
    /// Non-hex characters
    #[error("checksum must be lowercase hex")]
    InvalidHex,
}

/// An 8-character packet checksum
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Number of hex characters kept
    pub const LEN: usize = 8;

    /// Compute the checksum for a routing triple and payload
    #[must_use]
    pub fn compute(
        tool_type: &str,
        action: &str,
        item_type: Option<&str>,
        payload: &Map<String, Value>,
    ) -> Self {
        let canonical = canonical_json(&Value::Object(payload.clone()));
        let content = format!(
            "{}:{}:{}:{}",
            tool_type,
            action,
            item_type.unwrap_or_default(),
            canonical
        );
        let digest = blake3::hash(content.as_bytes());
        let mut hex = hex::encode(digest.as_bytes());
        hex.truncate(Self::LEN);
        Self(hex)
    }

    /// Parse a supplied checksum, checking only its shape
    ///
    /// # Errors
    ///
    /// Returns error if the value is not 8 lowercase hex characters
    pub fn parse(value: &str) -> Result<Self, ChecksumError> {
        if value.len() != Self::LEN {
            return Err(ChecksumError::InvalidLength {
                expected: Self::LEN,
                actual: value.len(),
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ChecksumError::InvalidHex);
        }
        Ok(Self(value.to_string()))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact JSON with object keys sorted at every depth
fn canonical_json(value: &Value) -> String {
    sort_keys(value.clone()).to_string()
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_checksum_shape() {
        let sum = Checksum::compute("todoist", "create", Some("task"), &payload(json!({"content": "x"})));
        assert_eq!(sum.as_str().len(), Checksum::LEN);
        assert!(Checksum::parse(sum.as_str()).is_ok());
    }

    #[test]
    fn test_checksum_key_order_independent() {
        let a = Checksum::compute("gcal", "create", Some("event"), &payload(json!({"a": 1, "b": {"y": 2, "x": 1}})));
        let b = Checksum::compute("gcal", "create", Some("event"), &payload(json!({"b": {"x": 1, "y": 2}, "a": 1})));
        assert_eq!(a, b);
    }

    #[test]
    fn test_checksum_sensitive_to_routing() {
        let p = payload(json!({"content": "x"}));
        let a = Checksum::compute("todoist", "create", Some("task"), &p);
        let b = Checksum::compute("todoist", "update", Some("task"), &p);
        assert_ne!(a, b);
    }

    #[test]
    fn test_checksum_parse_rejects() {
        assert_eq!(
            Checksum::parse("abc"),
            Err(ChecksumError::InvalidLength { expected: 8, actual: 3 })
        );
        assert_eq!(Checksum::parse("ABCDEF12"), Err(ChecksumError::InvalidHex));
        assert_eq!(Checksum::parse("zzzzzzzz"), Err(ChecksumError::InvalidHex));
    }
}

//! Request DTOs for the node's HTTP surface
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

/// Request body for PUT /cache/preload
#[derive(Debug, Clone, Deserialize)]
pub struct PreloadRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in milliseconds (resolved from the key if absent)
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl PreloadRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.trim().is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /cache/invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidatePatternRequest {
    /// Regular expression matched against cache keys
    pub pattern: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preload_request_deserialize() {
        let json = r#"{"key": "products", "value": [{"id": "p1"}]}"#;
        let req: PreloadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "products");
        assert_eq!(req.value, json!([{"id": "p1"}]));
        assert!(req.ttl_ms.is_none());
    }

    #[test]
    fn test_preload_request_with_ttl() {
        let json = r#"{"key": "config", "value": {}, "ttl_ms": 30000}"#;
        let req: PreloadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ttl_ms, Some(30_000));
    }

    #[test]
    fn test_validate_empty_key() {
        let req = PreloadRequest {
            key: "  ".to_string(),
            value: json!(1),
            ttl_ms: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_invalidate_pattern_request() {
        let req: InvalidatePatternRequest =
            serde_json::from_str(r#"{"pattern": "^orders"}"#).unwrap();
        assert_eq!(req.pattern, "^orders");
    }
}

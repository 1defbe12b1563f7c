//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

/// Keys longer than this are rejected by the HTTP surface
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The facade key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Seconds until expiry, 0 or absent = never
/// - `limit`: Namespace population limit, 0 or absent = unbounded
/// - `namespace`: Namespace, `default` when absent
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}

/// Optional `?namespace=` query parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_request_defaults() {
        let json = r#"{"key": "test", "value": "hello"}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "test");
        assert_eq!(req.value, json!("hello"));
        assert_eq!(req.ttl, 0);
        assert_eq!(req.limit, 0);
        assert!(req.namespace.is_none());
    }

    #[test]
    fn test_set_request_structured_value() {
        let json = r#"{"key": "k", "value": {"rows": [1, 2]}, "ttl": 60, "limit": 5, "namespace": "reports"}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.value, json!({"rows": [1, 2]}));
        assert_eq!(req.ttl, 60);
        assert_eq!(req.limit, 5);
        assert_eq!(req.namespace.as_deref(), Some("reports"));
    }

    #[test]
    fn test_validate_key_length() {
        let mut req = SetRequest {
            key: "".to_string(),
            value: Value::Null,
            ttl: 0,
            limit: 0,
            namespace: None,
        };
        assert!(req.validate().is_some());

        req.key = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(req.validate().is_some());

        req.key = "valid_key".to_string();
        assert!(req.validate().is_none());
    }
}

//! JSON wire types shared by the listeners and the forward writer.
//!
//! One instance's forward writer speaks to another instance's listeners, so
//! both sides of each transport live here: the `LogMessage` request frame and
//! the `LogResult` status reply.

use serde::{Deserialize, Serialize};

/// One log record on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub category: String,
    pub message: String,
}

/// Status reply for unary and streaming submissions. `status` follows HTTP
/// conventions: 200 success, 400 malformed or missing fields, 500 internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogResult {
    pub status: u16,
    #[serde(default)]
    pub num_success: u64,
    #[serde(default)]
    pub message: String,
}

impl LogResult {
    #[must_use]
    pub fn ok(num_success: u64) -> Self {
        Self {
            status: 200,
            num_success,
            message: "ok".to_string(),
        }
    }

    #[must_use]
    pub fn bad_request(num_success: u64, message: impl Into<String>) -> Self {
        Self {
            status: 400,
            num_success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(num_success: u64, message: impl Into<String>) -> Self {
        Self {
            status: 500,
            num_success,
            message: message.into(),
        }
    }
}

/// Pulls the first present, non-empty string field out of a JSON object,
/// trying each key in order. Producers may use canonical keys (`category`,
/// `message`) or the legacy shorthands (`cat`/`c`, `msg`/`m`).
#[must_use]
pub fn extract_field(body: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = body.get(key).and_then(serde_json::Value::as_str) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_field_prefers_earlier_keys() {
        let body = json!({"category": "app", "cat": "ignored"});
        assert_eq!(
            extract_field(&body, &["category", "cat", "c"]),
            Some("app".to_string())
        );
    }

    #[test]
    fn extract_field_accepts_legacy_shorthands() {
        let body = json!({"c": "app", "m": " hello "});
        assert_eq!(
            extract_field(&body, &["category", "cat", "c"]),
            Some("app".to_string())
        );
        assert_eq!(
            extract_field(&body, &["message", "msg", "m"]),
            Some("hello".to_string())
        );
    }

    #[test]
    fn extract_field_skips_blank_and_non_string_values() {
        let body = json!({"category": "   ", "cat": 42, "c": "real"});
        assert_eq!(
            extract_field(&body, &["category", "cat", "c"]),
            Some("real".to_string())
        );
        assert_eq!(extract_field(&body, &["missing"]), None);
    }

    #[test]
    fn log_result_serializes_with_snake_case_fields() {
        let text = serde_json::to_string(&LogResult::ok(3)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], 200);
        assert_eq!(value["num_success"], 3);
    }
}

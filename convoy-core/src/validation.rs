//! Validation result values.
//!
//! Structural validation failures are ordinary values, never errors: callers
//! inspect the result and recover. Only state violations (invalid journey
//! transitions, unknown clients) surface as typed errors.

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of message or contract validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ValidationResult {
    /// A passing result.
    pub fn ok() -> Self {
        Self {
            valid: true,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// A passing result carrying extra detail (e.g. a created ID).
    pub fn ok_with_details(details: Value) -> Self {
        Self {
            valid: true,
            error_code: None,
            error_message: None,
            details: Some(details),
        }
    }

    /// A failing result with code and message.
    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_code: Some(code),
            error_message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Detail lookup helper for string fields (e.g. `handshake_id`).
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.as_ref()?.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_result() {
        let result = ValidationResult::ok();
        assert!(result.valid);
        assert!(result.error_code.is_none());
    }

    #[test]
    fn test_fail_result_serializes_wire_code() {
        let result = ValidationResult::fail(ErrorCode::PayloadTooLarge, "too big");
        let raw = serde_json::to_value(&result).unwrap();
        assert_eq!(raw["valid"], false);
        assert_eq!(raw["error_code"], "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_detail_str() {
        let result = ValidationResult::ok_with_details(json!({"handshake_id": "handshake-1"}));
        assert_eq!(result.detail_str("handshake_id"), Some("handshake-1"));
        assert_eq!(result.detail_str("contract_id"), None);
    }
}

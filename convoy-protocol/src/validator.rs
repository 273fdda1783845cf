//! Message and contract validation.
//!
//! All checks return [`ValidationResult`] values; nothing in this module
//! errors. Message validation runs against the raw JSON form so externally
//! produced envelopes can be rejected before any decoding is attempted.

use convoy_core::{Contract, ConvoyConfig, ErrorCode, ProtocolMessage, ValidationResult};
use serde_json::{json, Map, Value};

/// Fields every envelope must carry on the wire.
const REQUIRED_FIELDS: [&str; 7] = [
    "protocol_version",
    "message_id",
    "timestamp",
    "source_agent",
    "target_agent",
    "message_type",
    "security",
];

const VALID_MESSAGE_TYPES: [&str; 4] = ["request", "response", "event", "error"];
const VALID_ENCRYPTION: [&str; 2] = ["none", "aes256"];

// ============================================================================
// MESSAGE VALIDATOR
// ============================================================================

/// Validates protocol messages against the wire specification.
///
/// Checks, in order: total size, required fields, protocol version format,
/// message type, agent structures, security structure, payload size.
#[derive(Debug, Clone)]
pub struct MessageValidator {
    max_message_size_bytes: usize,
    max_payload_size_bytes: usize,
}

impl MessageValidator {
    pub fn new(config: &ConvoyConfig) -> Self {
        Self {
            max_message_size_bytes: config.max_message_size_bytes,
            max_payload_size_bytes: config.max_payload_size_bytes,
        }
    }

    /// Validate a decoded message by re-serializing to its wire form.
    pub fn validate_message(&self, message: &ProtocolMessage) -> ValidationResult {
        match serde_json::to_value(message) {
            Ok(raw) => self.validate(&raw),
            Err(e) => ValidationResult::fail(
                ErrorCode::InternalError,
                format!("Message not serializable: {}", e),
            ),
        }
    }

    /// Validate a raw JSON envelope.
    pub fn validate(&self, raw: &Value) -> ValidationResult {
        let size = raw.to_string().len();
        if size > self.max_message_size_bytes {
            return ValidationResult::fail(
                ErrorCode::MessageTooLarge,
                format!("Message size exceeds {} bytes", self.max_message_size_bytes),
            );
        }

        let Some(fields) = raw.as_object() else {
            return ValidationResult::fail(
                ErrorCode::MissingRequiredField,
                "Message must be a JSON object",
            );
        };

        for field in REQUIRED_FIELDS {
            if !fields.contains_key(field) {
                return ValidationResult::fail(
                    ErrorCode::MissingRequiredField,
                    format!("Required field missing: {}", field),
                );
            }
        }

        if !is_valid_protocol_version(&fields["protocol_version"]) {
            return ValidationResult::fail(
                ErrorCode::InvalidProtocolVersion,
                format!("Invalid protocol version: {}", fields["protocol_version"]),
            );
        }

        let message_type = fields["message_type"].as_str().unwrap_or_default();
        if !VALID_MESSAGE_TYPES.contains(&message_type) {
            return ValidationResult::fail(
                ErrorCode::InvalidMessageType,
                format!("Message type must be one of: {:?}", VALID_MESSAGE_TYPES),
            );
        }

        for agent_field in ["source_agent", "target_agent"] {
            if !is_valid_agent(&fields[agent_field]) {
                return ValidationResult::fail(
                    ErrorCode::InvalidAgentStructure,
                    format!("Invalid {} structure", agent_field),
                );
            }
        }

        if !is_valid_security(&fields["security"]) {
            return ValidationResult::fail(
                ErrorCode::InvalidSecurityStructure,
                "Invalid security structure",
            );
        }

        let payload_size = fields
            .get("payload")
            .map(|p| p.to_string().len())
            .unwrap_or(0);
        if payload_size > self.max_payload_size_bytes {
            return ValidationResult::fail(
                ErrorCode::PayloadTooLarge,
                format!("Payload size exceeds {} bytes", self.max_payload_size_bytes),
            );
        }

        ValidationResult::ok()
    }
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new(&ConvoyConfig::default())
    }
}

/// Protocol versions look like `major.minor`, both numeric.
fn is_valid_protocol_version(version: &Value) -> bool {
    let Some(version) = version.as_str() else {
        return false;
    };
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 2
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_valid_agent(agent: &Value) -> bool {
    let Some(agent) = agent.as_object() else {
        return false;
    };
    ["agent_id", "domain", "version"]
        .iter()
        .all(|f| agent.contains_key(*f))
}

fn is_valid_security(security: &Value) -> bool {
    let Some(security) = security.as_object() else {
        return false;
    };
    if !security.contains_key("auth_token") {
        return false;
    }
    match security.get("encryption") {
        None => true,
        Some(e) => e
            .as_str()
            .is_some_and(|e| VALID_ENCRYPTION.contains(&e)),
    }
}

// ============================================================================
// CONTRACT VALIDATOR
// ============================================================================

/// Validates inter-agent contracts before they are stored.
#[derive(Debug, Clone, Default)]
pub struct ContractValidator;

impl ContractValidator {
    /// Validate contract structure and content.
    pub fn validate_contract(&self, contract: &Contract) -> ValidationResult {
        if contract.contract_id.is_empty() {
            return ValidationResult::fail(ErrorCode::InvalidContract, "Contract ID is empty");
        }

        if contract.participants.len() < 2 {
            return ValidationResult::fail(
                ErrorCode::InvalidContract,
                "Contract must have at least 2 participants",
            );
        }

        if contract.participants.iter().any(|p| p.is_empty()) {
            return ValidationResult::fail(
                ErrorCode::InvalidContract,
                "Contract participants must be non-empty agent IDs",
            );
        }

        ValidationResult::ok()
    }

    /// Check if a provided schema covers an expected schema.
    ///
    /// Key-presence only, not full schema validation.
    pub fn check_schema_compatibility(
        &self,
        provided: &Map<String, Value>,
        expected: &Map<String, Value>,
    ) -> ValidationResult {
        let missing: Vec<&String> = expected
            .keys()
            .filter(|k| !provided.contains_key(*k))
            .collect();

        if !missing.is_empty() {
            return ValidationResult::fail(
                ErrorCode::SchemaMismatch,
                "Provided schema missing required fields",
            )
            .with_details(json!({ "missing_fields": missing }));
        }

        ValidationResult::ok()
    }
}

// ============================================================================
// TOKEN VALIDATION SEAM
// ============================================================================

/// Pluggable auth-token validation.
///
/// The broker never validates tokens itself; deployments inject an
/// implementation (JWT, mTLS-derived, ...) behind this seam.
pub trait TokenValidator: Send + Sync {
    fn validate_token(&self, token: &str, target_agent_id: &str) -> ValidationResult;
}

/// Permissive default: accepts any non-empty token.
#[derive(Debug, Clone, Default)]
pub struct AllowAllTokens;

impl TokenValidator for AllowAllTokens {
    fn validate_token(&self, token: &str, _target_agent_id: &str) -> ValidationResult {
        if token.is_empty() {
            return ValidationResult::fail(ErrorCode::AuthFailed, "Empty auth token");
        }
        ValidationResult::ok()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::{AgentRef, MessageKind, SecurityContext};
    use proptest::prelude::*;

    fn make_message() -> ProtocolMessage {
        ProtocolMessage::new(
            AgentRef::new("gen", "generation", "1.0.0"),
            AgentRef::new("val", "validation", "1.0.0"),
            MessageKind::Request,
            Map::new(),
            SecurityContext::new("token"),
        )
    }

    fn raw(message: &ProtocolMessage) -> Value {
        serde_json::to_value(message).unwrap()
    }

    #[test]
    fn test_well_formed_message_passes() {
        let result = MessageValidator::default().validate_message(&make_message());
        assert!(result.valid, "{:?}", result);
    }

    #[test]
    fn test_missing_required_field() {
        let mut envelope = raw(&make_message());
        envelope.as_object_mut().unwrap().remove("security");

        let result = MessageValidator::default().validate(&envelope);
        assert_eq!(result.error_code, Some(ErrorCode::MissingRequiredField));
    }

    #[test]
    fn test_invalid_protocol_version() {
        for bad in ["1", "1.0.0", "one.zero", "", "1.", ".0"] {
            let mut envelope = raw(&make_message());
            envelope["protocol_version"] = Value::from(bad);
            let result = MessageValidator::default().validate(&envelope);
            assert_eq!(
                result.error_code,
                Some(ErrorCode::InvalidProtocolVersion),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_message_type() {
        let mut envelope = raw(&make_message());
        envelope["message_type"] = Value::from("broadcast");
        let result = MessageValidator::default().validate(&envelope);
        assert_eq!(result.error_code, Some(ErrorCode::InvalidMessageType));
    }

    #[test]
    fn test_invalid_agent_structure() {
        let mut envelope = raw(&make_message());
        envelope["target_agent"] = json!({"agent_id": "val"});
        let result = MessageValidator::default().validate(&envelope);
        assert_eq!(result.error_code, Some(ErrorCode::InvalidAgentStructure));
    }

    #[test]
    fn test_invalid_security_structure() {
        let mut envelope = raw(&make_message());
        envelope["security"] = json!({"auth_token": "t", "encryption": "rot13"});
        let result = MessageValidator::default().validate(&envelope);
        assert_eq!(result.error_code, Some(ErrorCode::InvalidSecurityStructure));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut message = make_message();
        message
            .payload
            .insert("blob".to_string(), Value::from("x".repeat(900_001)));
        let result = MessageValidator::default().validate_message(&message);
        assert_eq!(result.error_code, Some(ErrorCode::PayloadTooLarge));
    }

    #[test]
    fn test_oversized_message_rejected_before_field_checks() {
        // An envelope that is both huge and missing fields reports size first.
        let envelope = json!({"junk": "x".repeat(1_000_001)});
        let result = MessageValidator::default().validate(&envelope);
        assert_eq!(result.error_code, Some(ErrorCode::MessageTooLarge));
    }

    #[test]
    fn test_contract_participant_count() {
        let validator = ContractValidator;
        let contract = Contract::new(vec!["only-one".to_string()], Map::new(), Map::new());
        let result = validator.validate_contract(&contract);
        assert_eq!(result.error_code, Some(ErrorCode::InvalidContract));

        let contract = Contract::new(
            vec!["a".to_string(), "b".to_string()],
            Map::new(),
            Map::new(),
        );
        assert!(validator.validate_contract(&contract).valid);
    }

    #[test]
    fn test_schema_compatibility_reports_missing_keys() {
        let validator = ContractValidator;
        let mut provided = Map::new();
        provided.insert("rows".to_string(), json!({}));
        let mut expected = Map::new();
        expected.insert("rows".to_string(), json!({}));
        expected.insert("schema_version".to_string(), json!({}));

        let result = validator.check_schema_compatibility(&provided, &expected);
        assert_eq!(result.error_code, Some(ErrorCode::SchemaMismatch));
        let missing = &result.details.as_ref().unwrap()["missing_fields"];
        assert_eq!(missing[0], "schema_version");

        assert!(validator
            .check_schema_compatibility(&expected, &provided)
            .valid);
    }

    #[test]
    fn test_allow_all_tokens() {
        let validator = AllowAllTokens;
        assert!(validator.validate_token("anything", "val").valid);
        assert_eq!(
            validator.validate_token("", "val").error_code,
            Some(ErrorCode::AuthFailed)
        );
    }

    proptest! {
        #[test]
        fn prop_two_numeric_parts_always_valid(major in 0u32..1000, minor in 0u32..1000) {
            let version = Value::from(format!("{}.{}", major, minor));
            prop_assert!(is_valid_protocol_version(&version));
        }
    }
}

//! Protocol message types for agent-to-agent communication.
//!
//! Implements the v1.0 JSON message envelope: identities, intent, payload,
//! security context, and correlation/contract IDs carried in the payload.

use crate::{new_entity_id, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Protocol version emitted by this implementation.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// AGENT IDENTITY
// ============================================================================

/// Agent identity triple carried in message envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentRef {
    /// Unique agent identifier (e.g., "dataset-provisioner")
    pub agent_id: String,
    /// Domain the agent operates in (e.g., "dataops")
    pub domain: String,
    /// Agent version (semantic versioning)
    pub version: String,
}

impl AgentRef {
    pub fn new(
        agent_id: impl Into<String>,
        domain: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            domain: domain.into(),
            version: version.into(),
        }
    }
}

// ============================================================================
// MESSAGE KIND
// ============================================================================

/// Kind of protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Request for the target agent to perform work
    Request,
    /// Response to a prior request
    Response,
    /// One-way notification
    Event,
    /// Error response
    Error,
}

impl MessageKind {
    /// Convert to wire string representation.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
            MessageKind::Error => "error",
        }
    }

    /// Parse from wire string representation.
    pub fn from_wire_str(s: &str) -> Result<Self, MessageKindParseError> {
        match s {
            "request" => Ok(MessageKind::Request),
            "response" => Ok(MessageKind::Response),
            "event" => Ok(MessageKind::Event),
            "error" => Ok(MessageKind::Error),
            _ => Err(MessageKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

impl FromStr for MessageKind {
    type Err = MessageKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire_str(s)
    }
}

/// Error when parsing an invalid message kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKindParseError(pub String);

impl fmt::Display for MessageKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid message kind: {}", self.0)
    }
}

impl std::error::Error for MessageKindParseError {}

// ============================================================================
// SECURITY CONTEXT
// ============================================================================

/// Payload encryption scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Payload carried in the clear
    None,
    /// Payload encrypted with AES-256
    Aes256,
}

/// Security information for message authentication and encryption.
///
/// Token validation itself is pluggable; this only carries the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub auth_token: String,
    pub encryption: Encryption,
}

impl SecurityContext {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            encryption: Encryption::None,
        }
    }
}

// ============================================================================
// ERROR CODES
// ============================================================================

/// Standard wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CapabilityNotFound,
    SchemaMismatch,
    AuthFailed,
    Timeout,
    InternalError,
    RateLimitExceeded,
    ContractViolation,
    SecurityPolicyViolation,
    MessageTooLarge,
    PayloadTooLarge,
    MissingRequiredField,
    InvalidProtocolVersion,
    InvalidMessageType,
    InvalidAgentStructure,
    InvalidSecurityStructure,
    /// Contract failed structural validation (participants, schema typing)
    InvalidContract,
}

impl ErrorCode {
    /// Wire form (SCREAMING_SNAKE_CASE).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CapabilityNotFound => "CAPABILITY_NOT_FOUND",
            ErrorCode::SchemaMismatch => "SCHEMA_MISMATCH",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ContractViolation => "CONTRACT_VIOLATION",
            ErrorCode::SecurityPolicyViolation => "SECURITY_POLICY_VIOLATION",
            ErrorCode::MessageTooLarge => "MESSAGE_TOO_LARGE",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidProtocolVersion => "INVALID_PROTOCOL_VERSION",
            ErrorCode::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            ErrorCode::InvalidAgentStructure => "INVALID_AGENT_STRUCTURE",
            ErrorCode::InvalidSecurityStructure => "INVALID_SECURITY_STRUCTURE",
            ErrorCode::InvalidContract => "INVALID_CONTRACT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error response payload format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retry_after: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after: 0,
            correlation_id: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

// ============================================================================
// PROTOCOL MESSAGE
// ============================================================================

/// Immutable message envelope for agent-to-agent communication.
///
/// Correlation and contract IDs travel inside the payload so intermediate
/// components never need to understand application payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub protocol_version: String,
    pub message_id: EntityId,
    pub timestamp: Timestamp,
    pub source_agent: AgentRef,
    pub target_agent: AgentRef,
    #[serde(rename = "message_type")]
    pub kind: MessageKind,
    pub intent: Option<String>,
    pub payload: Map<String, Value>,
    pub security: SecurityContext,
}

impl ProtocolMessage {
    /// Create a new message with a fresh ID and current timestamp.
    pub fn new(
        source_agent: AgentRef,
        target_agent: AgentRef,
        kind: MessageKind,
        payload: Map<String, Value>,
        security: SecurityContext,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            message_id: new_entity_id(),
            timestamp: Utc::now(),
            source_agent,
            target_agent,
            kind,
            intent: None,
            payload,
            security,
        }
    }

    /// Set the intent.
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Create a response message to this message.
    ///
    /// Swaps source/target agents, keeps the intent and security context.
    pub fn create_response(&self, payload: Map<String, Value>, kind: MessageKind) -> Self {
        Self {
            protocol_version: self.protocol_version.clone(),
            message_id: new_entity_id(),
            timestamp: Utc::now(),
            source_agent: self.target_agent.clone(),
            target_agent: self.source_agent.clone(),
            kind,
            intent: self.intent.clone(),
            payload,
            security: self.security.clone(),
        }
    }

    /// Create an error response carrying the given error payload.
    pub fn create_error_response(&self, error: ErrorResponse) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "error".to_string(),
            serde_json::to_value(error).unwrap_or(Value::Null),
        );
        self.create_response(payload, MessageKind::Error)
    }

    /// Correlation ID from the payload, if present.
    pub fn correlation_id(&self) -> Option<&str> {
        self.payload.get("correlation_id").and_then(Value::as_str)
    }

    /// Contract ID from the payload, if present.
    pub fn contract_id(&self) -> Option<&str> {
        self.payload.get("contract_id").and_then(Value::as_str)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_message() -> ProtocolMessage {
        let mut payload = Map::new();
        payload.insert("contract_id".to_string(), Value::from("contract-1"));
        ProtocolMessage::new(
            AgentRef::new("gen", "generation", "1.0.0"),
            AgentRef::new("val", "validation", "1.0.0"),
            MessageKind::Request,
            payload,
            SecurityContext::new("token-123"),
        )
        .with_intent("validate_data")
    }

    #[test]
    fn test_message_kind_roundtrip() {
        for kind in [
            MessageKind::Request,
            MessageKind::Response,
            MessageKind::Event,
            MessageKind::Error,
        ] {
            let parsed = MessageKind::from_wire_str(kind.as_wire_str()).unwrap();
            assert_eq!(kind, parsed);
        }
        assert!(MessageKind::from_wire_str("broadcast").is_err());
    }

    #[test]
    fn test_json_roundtrip_preserves_wire_shape() {
        let msg = make_message();
        let json = msg.to_json().unwrap();

        // Wire field names per the protocol, not Rust names
        let raw: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw["protocol_version"], "1.0");
        assert_eq!(raw["message_type"], "request");
        assert_eq!(raw["source_agent"]["agent_id"], "gen");
        assert_eq!(raw["security"]["encryption"], "none");

        let back = ProtocolMessage::from_json(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_create_response_swaps_agents() {
        let msg = make_message();
        let response = msg.create_response(Map::new(), MessageKind::Response);

        assert_eq!(response.source_agent, msg.target_agent);
        assert_eq!(response.target_agent, msg.source_agent);
        assert_eq!(response.intent, msg.intent);
        assert_eq!(response.security, msg.security);
        assert_ne!(response.message_id, msg.message_id);
    }

    #[test]
    fn test_create_error_response() {
        let msg = make_message();
        let response = msg.create_error_response(ErrorResponse::new(
            ErrorCode::ContractViolation,
            "Contract not active",
        ));

        assert_eq!(response.kind, MessageKind::Error);
        let error = &response.payload["error"];
        assert_eq!(error["code"], "CONTRACT_VIOLATION");
        assert_eq!(error["retry_after"], 0);
    }

    #[test]
    fn test_payload_accessors() {
        let msg = make_message();
        assert_eq!(msg.contract_id(), Some("contract-1"));
        assert_eq!(msg.correlation_id(), None);
    }

    proptest! {
        #[test]
        fn prop_unknown_kind_strings_never_parse(s in "[a-z]{1,12}") {
            prop_assume!(!matches!(s.as_str(), "request" | "response" | "event" | "error"));
            prop_assert!(MessageKind::from_wire_str(&s).is_err());
        }
    }
}

//! Error types for Convoy operations

use thiserror::Error;

/// Protocol-layer errors.
///
/// Structural message/contract validation failures are NOT errors; they are
/// reported as [`crate::ValidationResult`] values and never thrown. This enum
/// covers the cases where no sane continuation exists at the call site.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Agent not registered: {agent_id}")]
    AgentNotRegistered { agent_id: String },

    #[error("Handshake not found: {handshake_id}")]
    HandshakeNotFound { handshake_id: String },

    #[error("Contract not found: {contract_id}")]
    ContractNotFound { contract_id: String },

    #[error("Collaboration not found: {collaboration_id}")]
    CollaborationNotFound { collaboration_id: String },
}

/// Journey lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JourneyError {
    #[error("Invalid transition: {stage} + {event}")]
    InvalidTransition { stage: String, event: String },

    #[error("Cannot complete rollback: no previous stage recorded for client {client_id}")]
    NoPreviousStage { client_id: String },

    #[error("Journey not found for client {client_id}")]
    NotFound { client_id: String },

    #[error("Journey already exists for client {client_id}")]
    AlreadyExists { client_id: String },
}

/// Unit-of-work execution errors.
///
/// Task failures are retried and then surfaced inside
/// [`crate::ExecutionResult`]; only pre-execution rejections are errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Circular dependencies detected in unit of work {work_id}")]
    DependencyCycle { work_id: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Serialization errors for the persistence contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to serialize {entity}: {reason}")]
    Serialize { entity: String, reason: String },

    #[error("Failed to deserialize {entity}: {reason}")]
    Deserialize { entity: String, reason: String },
}

/// Master error type for all Convoy errors.
#[derive(Debug, Clone, Error)]
pub enum ConvoyError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Journey error: {0}")]
    Journey(#[from] JourneyError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type alias for Convoy operations.
pub type ConvoyResult<T> = Result<T, ConvoyError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JourneyError::InvalidTransition {
            stage: "sandbox".to_string(),
            event: "mark_complete".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid transition: sandbox + mark_complete");
    }

    #[test]
    fn test_error_conversion() {
        let journey = ConvoyError::from(JourneyError::NotFound {
            client_id: "acme".to_string(),
        });
        assert!(matches!(journey, ConvoyError::Journey(_)));

        let execution = ConvoyError::from(ExecutionError::DependencyCycle {
            work_id: "uow-1".to_string(),
        });
        assert!(matches!(execution, ConvoyError::Execution(_)));

        let protocol = ConvoyError::from(ProtocolError::AgentNotRegistered {
            agent_id: "gen".to_string(),
        });
        assert!(matches!(protocol, ConvoyError::Protocol(_)));
    }
}

//! Handshake, contract, and collaboration types.
//!
//! A handshake is a time-boxed negotiation between two agents; acceptance
//! materializes a contract, and messages exchanged under a contract are
//! metered by a collaboration session.

use crate::{prefixed_id, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

// ============================================================================
// HANDSHAKE
// ============================================================================

/// Status of a handshake negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeStatus {
    /// Waiting for the target agent to accept
    Pending,
    /// Accepted; a contract has been created
    Accepted,
    /// Rejected by the target agent (terminal)
    Rejected,
}

impl fmt::Display for HandshakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeStatus::Pending => "pending",
            HandshakeStatus::Accepted => "accepted",
            HandshakeStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// A pending negotiation between two agents, valid until `expires_at`.
///
/// Expiry is lazily checked; expired entries are reclaimed only by an
/// explicit sweep, never by a background timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub handshake_id: String,
    pub source_agent_id: String,
    pub target_agent_id: String,
    /// Intent the source wants the target to serve
    pub intent: String,
    pub status: HandshakeStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Handshake {
    /// Create a new pending handshake with the given TTL.
    pub fn new(
        source_agent_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        intent: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(5));
        Self {
            handshake_id: prefixed_id("handshake"),
            source_agent_id: source_agent_id.into(),
            target_agent_id: target_agent_id.into(),
            intent: intent.into(),
            status: HandshakeStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if the handshake has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

/// Status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    /// Gating message routing between participants
    Active,
    /// Terminated; messages referencing it are rejected
    Terminated,
}

/// Validated agreement between agents gating message routing.
///
/// Schemas are immutable once the contract is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    /// Participating agent IDs (at least two)
    pub participants: Vec<String>,
    pub input_schema: Map<String, Value>,
    pub output_schema: Map<String, Value>,
    pub security_policy: Map<String, Value>,
    pub created_at: Timestamp,
    pub status: ContractStatus,
}

impl Contract {
    /// Create an active contract between two agents.
    pub fn new(
        participants: Vec<String>,
        input_schema: Map<String, Value>,
        output_schema: Map<String, Value>,
    ) -> Self {
        Self {
            contract_id: prefixed_id("contract"),
            participants,
            input_schema,
            output_schema,
            security_policy: Map::new(),
            created_at: Utc::now(),
            status: ContractStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }
}

// ============================================================================
// COLLABORATION
// ============================================================================

/// A tracked, metered session of messages exchanged under one contract.
///
/// Lazily created on the first message carrying the contract ID; removed
/// when the collaboration is terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaboration {
    pub collaboration_id: String,
    pub contract_id: String,
    pub participants: Vec<String>,
    pub message_count: u64,
    pub started_at: Timestamp,
    pub last_activity: Timestamp,
}

impl Collaboration {
    /// Start a collaboration session under a contract.
    pub fn new(contract_id: impl Into<String>, participants: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            collaboration_id: prefixed_id("collab"),
            contract_id: contract_id.into(),
            participants,
            message_count: 0,
            started_at: now,
            last_activity: now,
        }
    }

    /// Record one routed message.
    pub fn record_message(&mut self) {
        self.message_count += 1;
        self.last_activity = Utc::now();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_handshake_is_pending_and_unexpired() {
        let hs = Handshake::new("a", "b", "provision", Duration::from_secs(5));
        assert_eq!(hs.status, HandshakeStatus::Pending);
        assert!(!hs.is_expired());
        assert!(hs.handshake_id.starts_with("handshake-"));
    }

    #[test]
    fn test_past_dated_handshake_expires() {
        let mut hs = Handshake::new("a", "b", "provision", Duration::from_secs(5));
        hs.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(hs.is_expired());
    }

    #[test]
    fn test_contract_starts_active() {
        let contract = Contract::new(
            vec!["a".to_string(), "b".to_string()],
            Map::new(),
            Map::new(),
        );
        assert!(contract.is_active());
        assert!(contract.contract_id.starts_with("contract-"));
    }

    #[test]
    fn test_collaboration_metering() {
        let mut collab = Collaboration::new("contract-1", vec!["a".into(), "b".into()]);
        assert_eq!(collab.message_count, 0);
        collab.record_message();
        collab.record_message();
        assert_eq!(collab.message_count, 2);
        assert!(collab.last_activity >= collab.started_at);
    }
}

//! Protocol broker: handshake negotiation, contract storage, and
//! contract-gated message routing.
//!
//! The broker composes the handshake manager, contract store, router, and
//! validators. Every operation returns a [`ValidationResult`]; wire-level
//! failures are values, never panics or typed errors.

use crate::registry::CapabilityDiscovery;
use crate::validator::{ContractValidator, MessageValidator};
use convoy_core::{
    Collaboration, Contract, ConvoyConfig, ErrorCode, Handshake, HandshakeStatus, ProtocolMessage,
    ValidationResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// AGENT HANDLER SEAM
// ============================================================================

/// Receiving side of message routing.
///
/// Implementations are invoked synchronously, outside any broker lock, so a
/// handler may call back into the broker.
pub trait AgentHandler: Send + Sync {
    fn on_message(&self, message: &ProtocolMessage);
}

// ============================================================================
// HANDSHAKE MANAGER
// ============================================================================

/// In-memory store of handshake negotiations.
///
/// Expiry is lazy: expired entries linger until a caller touches them or
/// runs [`HandshakeManager::sweep_expired`].
#[derive(Debug)]
pub struct HandshakeManager {
    handshakes: RwLock<HashMap<String, Handshake>>,
    ttl: Duration,
}

impl HandshakeManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            handshakes: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a pending handshake and return its ID.
    pub fn create(&self, source_agent_id: &str, target_agent_id: &str, intent: &str) -> String {
        let handshake = Handshake::new(source_agent_id, target_agent_id, intent, self.ttl);
        let handshake_id = handshake.handshake_id.clone();
        self.handshakes
            .write()
            .unwrap()
            .insert(handshake_id.clone(), handshake);
        handshake_id
    }

    pub fn get(&self, handshake_id: &str) -> Option<Handshake> {
        self.handshakes.read().unwrap().get(handshake_id).cloned()
    }

    pub fn update_status(&self, handshake_id: &str, status: HandshakeStatus) -> bool {
        let mut handshakes = self.handshakes.write().unwrap();
        match handshakes.get_mut(handshake_id) {
            Some(handshake) => {
                handshake.status = status;
                true
            }
            None => false,
        }
    }

    /// Drop expired entries, returning how many were reclaimed.
    pub fn sweep_expired(&self) -> usize {
        let mut handshakes = self.handshakes.write().unwrap();
        let before = handshakes.len();
        handshakes.retain(|_, h| !h.is_expired());
        before - handshakes.len()
    }
}

// ============================================================================
// CONTRACT STORE
// ============================================================================

/// In-memory store of negotiated contracts.
#[derive(Debug, Default)]
pub struct ContractStore {
    contracts: RwLock<HashMap<String, Contract>>,
}

impl ContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, contract: Contract) {
        self.contracts
            .write()
            .unwrap()
            .insert(contract.contract_id.clone(), contract);
    }

    pub fn get(&self, contract_id: &str) -> Option<Contract> {
        self.contracts.read().unwrap().get(contract_id).cloned()
    }

    /// Mark a contract terminated. Returns false if unknown.
    pub fn terminate(&self, contract_id: &str) -> bool {
        let mut contracts = self.contracts.write().unwrap();
        match contracts.get_mut(contract_id) {
            Some(contract) => {
                contract.status = convoy_core::ContractStatus::Terminated;
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// MESSAGE ROUTER
// ============================================================================

/// Maps agent IDs to their handlers. Last registration wins.
#[derive(Default)]
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, Arc<dyn AgentHandler>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_id: impl Into<String>, handler: Arc<dyn AgentHandler>) {
        self.handlers.write().unwrap().insert(agent_id.into(), handler);
    }

    pub fn unregister(&self, agent_id: &str) -> bool {
        self.handlers.write().unwrap().remove(agent_id).is_some()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.handlers.read().unwrap().contains_key(agent_id)
    }

    /// Deliver a message to its target's handler.
    ///
    /// The handler reference is cloned out first so the invocation runs
    /// without the router lock held.
    pub fn route(&self, message: &ProtocolMessage) -> bool {
        let handler = {
            let handlers = self.handlers.read().unwrap();
            handlers.get(&message.target_agent.agent_id).cloned()
        };
        match handler {
            Some(handler) => {
                handler.on_message(message);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let agents: Vec<String> = self.handlers.read().unwrap().keys().cloned().collect();
        f.debug_struct("MessageRouter").field("agents", &agents).finish()
    }
}

// ============================================================================
// COLLABORATION STATS
// ============================================================================

/// Aggregate view of live collaborations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationStats {
    pub active_collaborations: usize,
    pub total_messages: u64,
}

// ============================================================================
// PROTOCOL BROKER
// ============================================================================

/// Central mediator for agent communication.
///
/// Owns handshake negotiation, contract lifecycle, validation, and routing.
/// An optional [`CapabilityDiscovery`] seeds contract schemas from the
/// participants' registered capabilities.
pub struct ProtocolBroker {
    handshakes: HandshakeManager,
    contracts: ContractStore,
    router: MessageRouter,
    message_validator: MessageValidator,
    contract_validator: ContractValidator,
    collaborations: RwLock<HashMap<String, Collaboration>>,
    discovery: Option<Arc<CapabilityDiscovery>>,
}

impl ProtocolBroker {
    pub fn new(config: &ConvoyConfig) -> Self {
        Self {
            handshakes: HandshakeManager::new(config.handshake_ttl),
            contracts: ContractStore::new(),
            router: MessageRouter::new(),
            message_validator: MessageValidator::new(config),
            contract_validator: ContractValidator,
            collaborations: RwLock::new(HashMap::new()),
            discovery: None,
        }
    }

    /// Wire in a discovery service so negotiated contracts inherit the
    /// participants' registered schemas.
    pub fn with_discovery(mut self, discovery: Arc<CapabilityDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    // ------------------------------------------------------------------
    // Agent registration
    // ------------------------------------------------------------------

    pub fn register_agent(&self, agent_id: impl Into<String>, handler: Arc<dyn AgentHandler>) {
        let agent_id = agent_id.into();
        info!(agent_id = %agent_id, "agent registered with broker");
        self.router.register(agent_id, handler);
    }

    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.router.unregister(agent_id);
        if removed {
            info!(agent_id = %agent_id, "agent unregistered from broker");
        }
        removed
    }

    pub fn is_agent_registered(&self, agent_id: &str) -> bool {
        self.router.is_registered(agent_id)
    }

    // ------------------------------------------------------------------
    // Handshake negotiation
    // ------------------------------------------------------------------

    /// Begin a handshake from `source` to `target` for an intent.
    ///
    /// The target must be registered with the broker. On success the result
    /// details carry `handshake_id`.
    pub fn initiate_handshake(
        &self,
        source_agent_id: &str,
        target_agent_id: &str,
        intent: &str,
    ) -> ValidationResult {
        if !self.router.is_registered(target_agent_id) {
            return ValidationResult::fail(
                ErrorCode::CapabilityNotFound,
                format!("Target agent not registered: {}", target_agent_id),
            );
        }

        let handshake_id = self.handshakes.create(source_agent_id, target_agent_id, intent);
        debug!(
            handshake_id = %handshake_id,
            source = %source_agent_id,
            target = %target_agent_id,
            intent = %intent,
            "handshake initiated"
        );
        ValidationResult::ok_with_details(json!({ "handshake_id": handshake_id }))
    }

    /// Accept a pending handshake, materializing a contract.
    ///
    /// Expired or unknown handshakes fail with `TIMEOUT`. On success the
    /// result details carry `contract_id`.
    pub fn accept_handshake(&self, handshake_id: &str) -> ValidationResult {
        let handshake = match self.handshakes.get(handshake_id) {
            Some(h) if !h.is_expired() => h,
            _ => {
                return ValidationResult::fail(
                    ErrorCode::Timeout,
                    format!("Handshake not found or expired: {}", handshake_id),
                );
            }
        };

        self.handshakes.update_status(handshake_id, HandshakeStatus::Accepted);

        let (input_schema, output_schema) = self.contract_schemas(&handshake);
        let contract = Contract::new(
            vec![
                handshake.source_agent_id.clone(),
                handshake.target_agent_id.clone(),
            ],
            input_schema,
            output_schema,
        );

        let result = self.contract_validator.validate_contract(&contract);
        if !result.valid {
            warn!(handshake_id = %handshake_id, "negotiated contract failed validation");
            return result;
        }

        let contract_id = contract.contract_id.clone();
        self.contracts.store(contract);
        info!(
            handshake_id = %handshake_id,
            contract_id = %contract_id,
            "handshake accepted, contract created"
        );
        ValidationResult::ok_with_details(json!({ "contract_id": contract_id }))
    }

    /// Reject a pending handshake.
    pub fn reject_handshake(&self, handshake_id: &str) -> ValidationResult {
        if !self.handshakes.update_status(handshake_id, HandshakeStatus::Rejected) {
            return ValidationResult::fail(
                ErrorCode::Timeout,
                format!("Handshake not found or expired: {}", handshake_id),
            );
        }
        debug!(handshake_id = %handshake_id, "handshake rejected");
        ValidationResult::ok()
    }

    /// Schemas for a negotiated contract: the target serves the intent, so
    /// its registered capability supplies both sides when discovery is wired.
    fn contract_schemas(&self, handshake: &Handshake) -> (Map<String, Value>, Map<String, Value>) {
        let spec = self
            .discovery
            .as_ref()
            .and_then(|d| d.capability(&handshake.target_agent_id))
            .filter(|spec| spec.matches_intent(&handshake.intent));
        match spec {
            Some(spec) => (spec.input_schema, spec.output_schema),
            None => (Map::new(), Map::new()),
        }
    }

    pub fn handshake(&self, handshake_id: &str) -> Option<Handshake> {
        self.handshakes.get(handshake_id)
    }

    /// Reclaim expired handshakes. Returns the number removed.
    pub fn sweep_expired_handshakes(&self) -> usize {
        let swept = self.handshakes.sweep_expired();
        if swept > 0 {
            debug!(swept, "expired handshakes reclaimed");
        }
        swept
    }

    pub fn contract(&self, contract_id: &str) -> Option<Contract> {
        self.contracts.get(contract_id)
    }

    // ------------------------------------------------------------------
    // Message routing
    // ------------------------------------------------------------------

    /// Validate and deliver a message.
    ///
    /// A message carrying a `contract_id` must reference an active contract;
    /// its delivery is metered on the corresponding collaboration session,
    /// created lazily on first use. Messages without a contract ID route
    /// unmetered.
    pub fn route_message(&self, message: &ProtocolMessage) -> ValidationResult {
        let result = self.message_validator.validate_message(message);
        if !result.valid {
            return result;
        }

        if let Some(contract_id) = message.contract_id() {
            let contract = match self.contracts.get(contract_id) {
                Some(c) if c.is_active() => c,
                _ => {
                    return ValidationResult::fail(
                        ErrorCode::ContractViolation,
                        format!("No active contract: {}", contract_id),
                    );
                }
            };

            let mut collaborations = self.collaborations.write().unwrap();
            collaborations
                .entry(contract_id.to_string())
                .or_insert_with(|| {
                    Collaboration::new(contract_id, contract.participants.clone())
                })
                .record_message();
        }

        if !self.router.route(message) {
            return ValidationResult::fail(
                ErrorCode::CapabilityNotFound,
                format!(
                    "No handler registered for agent: {}",
                    message.target_agent.agent_id
                ),
            );
        }

        debug!(
            message_id = %message.message_id,
            target = %message.target_agent.agent_id,
            "message delivered"
        );
        ValidationResult::ok()
    }

    // ------------------------------------------------------------------
    // Collaboration lifecycle
    // ------------------------------------------------------------------

    /// End the collaboration under a contract: terminates the contract and
    /// removes the session.
    pub fn terminate_collaboration(&self, contract_id: &str) -> ValidationResult {
        let removed = self.collaborations.write().unwrap().remove(contract_id);
        if removed.is_none() {
            return ValidationResult::fail(
                ErrorCode::InternalError,
                format!("No collaboration under contract: {}", contract_id),
            );
        }
        self.contracts.terminate(contract_id);
        info!(contract_id = %contract_id, "collaboration terminated");
        ValidationResult::ok()
    }

    pub fn collaboration(&self, contract_id: &str) -> Option<Collaboration> {
        self.collaborations.read().unwrap().get(contract_id).cloned()
    }

    pub fn collaboration_stats(&self) -> CollaborationStats {
        let collaborations = self.collaborations.read().unwrap();
        CollaborationStats {
            active_collaborations: collaborations.len(),
            total_messages: collaborations.values().map(|c| c.message_count).sum(),
        }
    }
}

impl Default for ProtocolBroker {
    fn default() -> Self {
        Self::new(&ConvoyConfig::default())
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Convoy Test Utilities
//!
//! Centralized test infrastructure for the Convoy workspace:
//! - Fixture builders for capabilities, messages, tasks, and units of work
//! - Recording agent handlers for routing assertions
//! - Scripted agent invokers for executor scenarios
//! - Proptest generators for wire enums

// Re-export core types for convenience
pub use convoy_core::{
    AgentRef, CapabilitySpec, Contract, ConvoyConfig, ErrorCode, JourneyStage, MessageKind,
    ProtocolMessage, RetryConfig, SecurityContext, Task, TaskStatus, UnitOfWork, WorkStatus,
};
pub use convoy_journey::AgentInvoker;
pub use convoy_protocol::AgentHandler;

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// FIXTURE BUILDERS
// ============================================================================

/// Capability spec for an agent serving a single intent, with matching
/// one-key input/output schemas.
pub fn make_capability(agent_id: &str, domain: &str, intent: &str) -> CapabilitySpec {
    let mut input_schema = Map::new();
    input_schema.insert("input".to_string(), json!({"type": "object"}));
    let mut output_schema = Map::new();
    output_schema.insert("result".to_string(), json!({"type": "object"}));

    CapabilitySpec::new(
        agent_id,
        domain,
        "1.0.0",
        vec![intent.to_string()],
        input_schema,
        output_schema,
    )
    .with_description(format!("{} agent", domain))
}

/// Well-formed request message between two agents.
pub fn make_request(source: &str, target: &str, payload: Map<String, Value>) -> ProtocolMessage {
    ProtocolMessage::new(
        AgentRef::new(source, "testing", "1.0.0"),
        AgentRef::new(target, "testing", "1.0.0"),
        MessageKind::Request,
        payload,
        SecurityContext::new("test-token"),
    )
}

/// Request tagged with a contract ID.
pub fn make_contract_request(source: &str, target: &str, contract_id: &str) -> ProtocolMessage {
    let mut payload = Map::new();
    payload.insert("contract_id".to_string(), Value::from(contract_id));
    make_request(source, target, payload)
}

/// Task bound to an agent and intent, with optional dependencies.
pub fn make_task(task_id: &str, agent_id: &str, intent: &str, depends_on: &[&str]) -> Task {
    Task::new(task_id, task_id, agent_id, intent)
        .with_depends_on(depends_on.iter().map(|s| s.to_string()).collect())
}

/// Three-task chain a -> b -> c across three agents.
pub fn make_chain_uow(client_id: &str) -> UnitOfWork {
    UnitOfWork::new(
        JourneyStage::Sandbox,
        client_id,
        vec![
            make_task("a", "gen", "generate_data", &[]),
            make_task("b", "val", "validate_data", &["a"]),
            make_task("c", "prov", "provision_dataset", &["b"]),
        ],
    )
}

// ============================================================================
// RECORDING HANDLER
// ============================================================================

/// Agent handler that records every delivered message.
#[derive(Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<ProtocolMessage>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<ProtocolMessage> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl AgentHandler for RecordingHandler {
    fn on_message(&self, message: &ProtocolMessage) {
        self.received.lock().unwrap().push(message.clone());
    }
}

// ============================================================================
// SCRIPTED INVOKERS
// ============================================================================

/// Invoker that always succeeds, echoing the task ID and visible inputs.
#[derive(Default)]
pub struct AlwaysSucceedInvoker {
    calls: Mutex<Vec<String>>,
}

impl AlwaysSucceedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task IDs in invocation order, including retries.
    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AgentInvoker for AlwaysSucceedInvoker {
    fn invoke(
        &self,
        task: &Task,
        task_results: &HashMap<String, Value>,
    ) -> Result<Value, String> {
        self.calls.lock().unwrap().push(task.task_id.clone());
        Ok(json!({
            "status": "success",
            "task_id": task.task_id,
            "inputs_seen": task_results.keys().collect::<Vec<_>>(),
        }))
    }
}

/// Invoker that fails named tasks a set number of times before succeeding.
///
/// Use `u32::MAX` for a permanently failing task.
#[derive(Default)]
pub struct FailNTimesInvoker {
    failures: HashMap<String, u32>,
    calls: Mutex<Vec<String>>,
}

impl FailNTimesInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, task_id: &str, times: u32) -> Self {
        self.failures.insert(task_id.to_string(), times);
        self
    }

    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AgentInvoker for FailNTimesInvoker {
    fn invoke(&self, task: &Task, _task_results: &HashMap<String, Value>) -> Result<Value, String> {
        self.calls.lock().unwrap().push(task.task_id.clone());

        let scripted = self.failures.get(&task.task_id).copied().unwrap_or(0);
        let attempts_so_far = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == &task.task_id)
            .count() as u32;
        if attempts_so_far <= scripted {
            return Err(format!("scripted failure for {}", task.task_id));
        }
        Ok(json!({ "status": "success", "task_id": task.task_id }))
    }
}

/// Retry config with millisecond backoffs for fast tests.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(4),
        backoff_multiplier: 2.0,
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub fn arb_message_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Request),
        Just(MessageKind::Response),
        Just(MessageKind::Event),
        Just(MessageKind::Error),
    ]
}

pub fn arb_journey_stage() -> impl Strategy<Value = JourneyStage> {
    prop::sample::select(JourneyStage::ALL.to_vec())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_uow_is_acyclic() {
        let uow = make_chain_uow("acme");
        assert!(!uow.has_circular_dependencies());
        assert_eq!(uow.tasks.len(), 3);
    }

    #[test]
    fn test_fail_n_times_invoker_script() {
        let invoker = FailNTimesInvoker::new().failing("a", 2);
        let task = make_task("a", "gen", "generate_data", &[]);
        let results = HashMap::new();

        assert!(invoker.invoke(&task, &results).is_err());
        assert!(invoker.invoke(&task, &results).is_err());
        assert!(invoker.invoke(&task, &results).is_ok());
        assert_eq!(invoker.call_order().len(), 3);
    }

    #[test]
    fn test_recording_handler_captures_messages() {
        let handler = RecordingHandler::new();
        handler.on_message(&make_request("gen", "val", Map::new()));
        assert_eq!(handler.received_count(), 1);
        assert_eq!(handler.received()[0].target_agent.agent_id, "val");
    }
}

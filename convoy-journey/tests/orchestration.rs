//! End-to-end orchestration: registry + broker + coordinator + executor.
//!
//! Wires real agents (handlers that answer through the broker) into the
//! full register -> handshake -> contract -> route -> execute -> promote
//! flow.

use convoy_core::{AgentRef, ConvoyConfig, JourneyStage, MessageKind, ProtocolMessage, WorkStatus};
use convoy_journey::{BrokerInvoker, JourneyCoordinator, UnitOfWorkExecutor};
use convoy_protocol::{AgentHandler, CapabilityDiscovery, ProtocolBroker};
use convoy_test_utils::{fast_retry, make_capability, make_chain_uow, make_contract_request};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Agent that answers every request with a correlated response message
/// routed back through the broker.
struct EchoAgent {
    agent_id: String,
    broker: Arc<ProtocolBroker>,
    handled: AtomicUsize,
}

impl EchoAgent {
    fn register(broker: &Arc<ProtocolBroker>, agent_id: &str) -> Arc<Self> {
        let agent = Arc::new(Self {
            agent_id: agent_id.to_string(),
            broker: broker.clone(),
            handled: AtomicUsize::new(0),
        });
        broker.register_agent(agent_id, agent.clone());
        agent
    }

    fn handled_count(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }
}

impl AgentHandler for EchoAgent {
    fn on_message(&self, message: &ProtocolMessage) {
        self.handled.fetch_add(1, Ordering::SeqCst);
        if message.kind != MessageKind::Request {
            return;
        }

        let mut payload = Map::new();
        payload.insert(
            "correlation_id".to_string(),
            Value::from(message.message_id.to_string()),
        );
        payload.insert(
            "result".to_string(),
            json!({ "status": "success", "handled_by": self.agent_id }),
        );
        let response = message.create_response(payload, MessageKind::Response);
        // Responses carry no contract_id, so they route unmetered.
        self.broker.route_message(&response);
    }
}

fn orchestrator_ref() -> AgentRef {
    AgentRef::new("orchestrator", "orchestration", "1.0.0")
}

#[test]
fn test_full_flow_from_registration_to_promotion() {
    let discovery = Arc::new(CapabilityDiscovery::new());
    discovery.register_capability(make_capability("gen", "generation", "generate_data"));
    discovery.register_capability(make_capability("val", "validation", "validate_data"));
    discovery.register_capability(make_capability("prov", "dataops", "provision_dataset"));

    let broker = Arc::new(
        ProtocolBroker::new(&ConvoyConfig::default()).with_discovery(discovery.clone()),
    );
    let gen = EchoAgent::register(&broker, "gen");
    let val = EchoAgent::register(&broker, "val");
    let prov = EchoAgent::register(&broker, "prov");

    // Sandbox journey starts before any work runs.
    let coordinator = JourneyCoordinator::new();
    coordinator.start_journey("acme", Map::new()).unwrap();
    assert_eq!(
        coordinator.journey_state("acme").unwrap().current_stage,
        JourneyStage::Sandbox
    );

    // Execute the sandbox unit of work through the broker.
    let invoker = Arc::new(BrokerInvoker::new(
        broker.clone(),
        orchestrator_ref(),
        "token",
    ));
    let executor = UnitOfWorkExecutor::new(invoker, fast_retry());
    let mut uow = make_chain_uow("acme");

    let result = executor.execute(&mut uow).unwrap();
    assert!(result.success, "{:?}", result);
    assert_eq!(result.status, WorkStatus::Completed);
    assert_eq!(result.completed_tasks, vec!["a", "b", "c"]);

    // Each agent handled exactly its one task request.
    assert_eq!(gen.handled_count(), 1);
    assert_eq!(val.handled_count(), 1);
    assert_eq!(prov.handled_count(), 1);

    // Task responses came back through the broker.
    let a_result = &result.task_results["a"];
    assert_eq!(a_result["result"]["handled_by"], "gen");

    // One contract and one metered message per task invocation.
    let stats = broker.collaboration_stats();
    assert_eq!(stats.active_collaborations, 3);
    assert_eq!(stats.total_messages, 3);

    // Sandbox succeeded: promote through pilot to production and complete.
    coordinator
        .promote_to_pilot("acme", "sandbox unit of work completed", None)
        .unwrap();
    coordinator.promote_to_production("acme", "", None).unwrap();
    let state = coordinator.mark_complete("acme", "go-live").unwrap();

    assert_eq!(state.current_stage, JourneyStage::Completed);
    assert_eq!(
        state.completed_stages,
        vec![
            JourneyStage::Sandbox,
            JourneyStage::Pilot,
            JourneyStage::Production
        ]
    );
    assert_eq!(state.stage_history.len(), 4);
}

#[test]
fn test_contract_gated_delivery_is_exactly_once() {
    let broker = Arc::new(ProtocolBroker::new(&ConvoyConfig::default()));
    let val = EchoAgent::register(&broker, "val");
    broker.register_agent(
        "gen",
        Arc::new(convoy_test_utils::RecordingHandler::new()),
    );

    let handshake = broker.initiate_handshake("gen", "val", "validate_data");
    let contract_id = broker
        .accept_handshake(handshake.detail_str("handshake_id").unwrap())
        .detail_str("contract_id")
        .unwrap()
        .to_string();

    // Each routed message is delivered to exactly one handler, once.
    let message = make_contract_request("gen", "val", &contract_id);
    assert!(broker.route_message(&message).valid);
    assert_eq!(val.handled_count(), 1);

    assert!(broker.route_message(&message).valid);
    assert_eq!(val.handled_count(), 2);
    assert_eq!(
        broker.collaboration(&contract_id).unwrap().message_count,
        2
    );

    // After termination nothing more is delivered.
    broker.terminate_collaboration(&contract_id);
    assert!(!broker.route_message(&message).valid);
    assert_eq!(val.handled_count(), 2);
}

#[test]
fn test_failed_sandbox_work_triggers_rollback_journey() {
    let broker = Arc::new(ProtocolBroker::new(&ConvoyConfig::default()));
    // No agents registered: every invocation fails and retries exhaust.
    let invoker = Arc::new(BrokerInvoker::new(
        broker.clone(),
        orchestrator_ref(),
        "token",
    ));
    let executor = UnitOfWorkExecutor::new(invoker, fast_retry());

    let coordinator = JourneyCoordinator::new();
    coordinator.start_journey("acme", Map::new()).unwrap();
    coordinator.promote_to_pilot("acme", "", None).unwrap();

    let mut uow = make_chain_uow("acme");
    let result = executor.execute(&mut uow).unwrap();
    assert!(!result.success);
    assert_eq!(result.status, WorkStatus::Failed);

    // Pilot work failed: roll the journey back to its previous stage.
    coordinator
        .initiate_rollback("acme", "pilot work failed")
        .unwrap();
    let state = coordinator.complete_rollback("acme", "").unwrap();
    assert_eq!(state.current_stage, JourneyStage::Pilot);
}

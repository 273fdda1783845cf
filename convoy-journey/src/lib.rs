//! Convoy Journey - Lifecycle Orchestration
//!
//! Client journey state machine, coordinator, and saga unit-of-work
//! executor. The state machine is pure; the coordinator owns storage and
//! locking; the executor drives dependency-ordered task graphs through an
//! injected agent invoker, with the broker-backed invoker as the production
//! wiring.

pub mod coordinator;
pub mod executor;
pub mod state_machine;

pub use coordinator::{JourneyCoordinator, JourneySummary};
pub use executor::{
    AgentInvoker, BrokerInvoker, ExecutionMetrics, ResponseCapture, UnitOfWorkExecutor,
};

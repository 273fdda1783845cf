//! Convoy Core - Entity Types
//!
//! Pure data structures for the Convoy multi-agent orchestration framework.
//! All other crates depend on this. This crate contains ONLY data types and
//! value-level helpers - no routing, locking, or execution logic.

mod capability;
mod config;
mod contract;
mod error;
mod identity;
mod journey;
mod message;
mod validation;
mod work;

pub use capability::{AgentMatch, CapabilitySpec, CompatibilityResult};
pub use config::{ConvoyConfig, RetryConfig};
pub use contract::{Collaboration, Contract, ContractStatus, Handshake, HandshakeStatus};
pub use error::{
    ConfigError, ConvoyError, ConvoyResult, ExecutionError, JourneyError, PersistenceError,
    ProtocolError,
};
pub use identity::{new_entity_id, prefixed_id, EntityId, Timestamp};
pub use journey::{JourneyStage, JourneyState, StageTransition, TransitionEvent};
pub use message::{
    AgentRef, Encryption, ErrorCode, ErrorResponse, MessageKind, MessageKindParseError,
    ProtocolMessage, SecurityContext, PROTOCOL_VERSION,
};
pub use validation::ValidationResult;
pub use work::{ExecutionResult, Task, TaskStatus, UnitOfWork, WorkStatus};

//! Convoy Protocol - Agent Communication
//!
//! Handshake negotiation, contract-gated message routing, and capability
//! discovery. The broker is the single mediator: agents register handlers,
//! negotiate contracts via handshakes, and exchange validated messages
//! metered per collaboration session.

pub mod broker;
pub mod registry;
pub mod validator;

pub use broker::{
    AgentHandler, CollaborationStats, ContractStore, HandshakeManager, MessageRouter,
    ProtocolBroker,
};
pub use registry::{CapabilityDiscovery, CapabilityRegistry, CompatibilityMatrix, RegistryStats};
pub use validator::{AllowAllTokens, ContractValidator, MessageValidator, TokenValidator};

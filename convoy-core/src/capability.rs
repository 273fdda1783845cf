//! Capability specifications and discovery results.

use crate::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agent capability specification.
///
/// Defines what an agent can do and how to interact with it. One spec per
/// agent ID; re-registration overwrites the previous spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub agent_id: String,
    pub domain: String,
    /// Agent version (semantic versioning)
    pub version: String,
    /// Intents this agent serves (e.g., "provision_test_dataset")
    pub intents: Vec<String>,
    pub input_schema: Map<String, Value>,
    pub output_schema: Map<String, Value>,
    /// Capabilities this agent needs from others
    pub requires: Vec<String>,
    /// Capabilities this agent offers
    pub provides: Vec<String>,
    pub description: String,
    pub registered_at: Timestamp,
}

impl CapabilitySpec {
    pub fn new(
        agent_id: impl Into<String>,
        domain: impl Into<String>,
        version: impl Into<String>,
        intents: Vec<String>,
        input_schema: Map<String, Value>,
        output_schema: Map<String, Value>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            domain: domain.into(),
            version: version.into(),
            intents,
            input_schema,
            output_schema,
            requires: Vec::new(),
            provides: Vec::new(),
            description: String::new(),
            registered_at: Utc::now(),
        }
    }

    pub fn with_requires(mut self, requires: Vec<String>) -> Self {
        self.requires = requires;
        self
    }

    pub fn with_provides(mut self, provides: Vec<String>) -> Self {
        self.provides = provides;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check if this capability serves the given intent.
    pub fn matches_intent(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }
}

/// A matched agent from a discovery query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMatch {
    pub agent_id: String,
    pub domain: String,
    pub version: String,
    pub capability: CapabilitySpec,
    /// 0.0 to 1.0, higher is a better match
    pub match_score: f64,
}

impl AgentMatch {
    /// Build an exact match (score 1.0) from a capability spec.
    pub fn exact(capability: CapabilitySpec) -> Self {
        Self {
            agent_id: capability.agent_id.clone(),
            domain: capability.domain.clone(),
            version: capability.version.clone(),
            capability,
            match_score: 1.0,
        }
    }
}

/// Result of a pairwise schema-compatibility check, cached by unordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub compatible: bool,
    pub agent_a: String,
    pub agent_b: String,
    pub schema_version: String,
    pub issues: Vec<String>,
    pub last_validated: Timestamp,
}

impl CompatibilityResult {
    pub fn new(agent_a: impl Into<String>, agent_b: impl Into<String>, issues: Vec<String>) -> Self {
        Self {
            compatible: issues.is_empty(),
            agent_a: agent_a.into(),
            agent_b: agent_b.into(),
            schema_version: "1.0".to_string(),
            issues,
            last_validated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_spec() -> CapabilitySpec {
        CapabilitySpec::new(
            "provisioner",
            "dataops",
            "1.2.0",
            vec!["provision_test_dataset".to_string()],
            Map::new(),
            Map::new(),
        )
        .with_provides(vec!["dataset_provisioning".to_string()])
    }

    #[test]
    fn test_matches_intent() {
        let spec = make_spec();
        assert!(spec.matches_intent("provision_test_dataset"));
        assert!(!spec.matches_intent("validate_data"));
    }

    #[test]
    fn test_exact_match_copies_identity() {
        let m = AgentMatch::exact(make_spec());
        assert_eq!(m.agent_id, "provisioner");
        assert_eq!(m.domain, "dataops");
        assert_eq!(m.match_score, 1.0);
    }

    #[test]
    fn test_compatibility_result_from_issues() {
        let ok = CompatibilityResult::new("a", "b", vec![]);
        assert!(ok.compatible);

        let bad = CompatibilityResult::new("a", "b", vec!["missing field x".to_string()]);
        assert!(!bad.compatible);
        assert_eq!(bad.issues.len(), 1);
    }
}

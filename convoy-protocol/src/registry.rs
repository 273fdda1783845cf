//! Capability registry, compatibility matrix, and discovery façade.

use convoy_core::{AgentMatch, CapabilitySpec, CompatibilityResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

// ============================================================================
// CAPABILITY REGISTRY
// ============================================================================

#[derive(Debug, Default)]
struct RegistryInner {
    /// agent_id -> capability (re-register overwrites)
    capabilities: HashMap<String, CapabilitySpec>,
    /// intent -> agent_ids
    intent_index: HashMap<String, HashSet<String>>,
    /// domain -> agent_ids
    domain_index: HashMap<String, HashSet<String>>,
}

/// Thread-safe storage of capability specifications with secondary
/// intent and domain indexes, kept in sync on register/unregister.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    inner: RwLock<RegistryInner>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent's capability, replacing any previous spec.
    pub fn register(&self, capability: CapabilitySpec) {
        let mut inner = self.inner.write().unwrap();
        let agent_id = capability.agent_id.clone();

        // Drop stale index entries from a previous registration
        if let Some(old) = inner.capabilities.remove(&agent_id) {
            Self::remove_from_indexes(&mut inner, &old);
        }

        for intent in &capability.intents {
            inner
                .intent_index
                .entry(intent.clone())
                .or_default()
                .insert(agent_id.clone());
        }
        inner
            .domain_index
            .entry(capability.domain.clone())
            .or_default()
            .insert(agent_id.clone());

        debug!(agent_id = %agent_id, domain = %capability.domain, "capability registered");
        inner.capabilities.insert(agent_id, capability);
    }

    /// Unregister an agent's capability. Returns false if unknown.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let Some(capability) = inner.capabilities.remove(agent_id) else {
            return false;
        };
        Self::remove_from_indexes(&mut inner, &capability);
        debug!(agent_id = %agent_id, "capability unregistered");
        true
    }

    fn remove_from_indexes(inner: &mut RegistryInner, capability: &CapabilitySpec) {
        for intent in &capability.intents {
            if let Some(ids) = inner.intent_index.get_mut(intent) {
                ids.remove(&capability.agent_id);
                if ids.is_empty() {
                    inner.intent_index.remove(intent);
                }
            }
        }
        if let Some(ids) = inner.domain_index.get_mut(&capability.domain) {
            ids.remove(&capability.agent_id);
            if ids.is_empty() {
                inner.domain_index.remove(&capability.domain);
            }
        }
    }

    pub fn get_capability(&self, agent_id: &str) -> Option<CapabilitySpec> {
        self.inner.read().unwrap().capabilities.get(agent_id).cloned()
    }

    pub fn all_capabilities(&self) -> Vec<CapabilitySpec> {
        self.inner.read().unwrap().capabilities.values().cloned().collect()
    }

    /// Agents serving a specific intent.
    pub fn find_by_intent(&self, intent: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner
            .intent_index
            .get(intent)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Agents in a specific domain.
    pub fn find_by_domain(&self, domain: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner
            .domain_index
            .get(domain)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn agent_count(&self) -> usize {
        self.inner.read().unwrap().capabilities.len()
    }
}

// ============================================================================
// COMPATIBILITY MATRIX
// ============================================================================

/// Cache of pairwise compatibility results, keyed by unordered agent pair.
#[derive(Debug, Default)]
pub struct CompatibilityMatrix {
    matrix: RwLock<HashMap<String, CompatibilityResult>>,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order-independent cache key for an agent pair.
    fn pair_key(agent_a: &str, agent_b: &str) -> String {
        if agent_a <= agent_b {
            format!("{}:{}", agent_a, agent_b)
        } else {
            format!("{}:{}", agent_b, agent_a)
        }
    }

    pub fn set(&self, result: CompatibilityResult) {
        let key = Self::pair_key(&result.agent_a, &result.agent_b);
        self.matrix.write().unwrap().insert(key, result);
    }

    pub fn get(&self, agent_a: &str, agent_b: &str) -> Option<CompatibilityResult> {
        let key = Self::pair_key(agent_a, agent_b);
        self.matrix.read().unwrap().get(&key).cloned()
    }

    pub fn clear(&self) {
        self.matrix.write().unwrap().clear();
    }
}

// ============================================================================
// REGISTRY STATS
// ============================================================================

/// Aggregate view of the registry for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub domains: usize,
    pub domain_distribution: HashMap<String, usize>,
    pub unique_intents: usize,
    /// Sorted for stable output
    pub intents: Vec<String>,
}

// ============================================================================
// DISCOVERY FAÇADE
// ============================================================================

/// Capability discovery service: registration, intent/domain/capability
/// queries, and cached pairwise schema-compatibility checks.
#[derive(Debug, Default)]
pub struct CapabilityDiscovery {
    registry: CapabilityRegistry,
    compatibility: CompatibilityMatrix,
}

impl CapabilityDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_capability(&self, capability: CapabilitySpec) {
        self.registry.register(capability);
    }

    pub fn unregister_capability(&self, agent_id: &str) -> bool {
        self.registry.unregister(agent_id)
    }

    pub fn capability(&self, agent_id: &str) -> Option<CapabilitySpec> {
        self.registry.get_capability(agent_id)
    }

    /// Discover agents serving an intent.
    pub fn discover_by_intent(&self, intent: &str) -> Vec<AgentMatch> {
        self.registry
            .find_by_intent(intent)
            .into_iter()
            .filter_map(|id| self.registry.get_capability(&id))
            .map(AgentMatch::exact)
            .collect()
    }

    /// Discover all agents in a domain.
    pub fn discover_by_domain(&self, domain: &str) -> Vec<AgentMatch> {
        self.registry
            .find_by_domain(domain)
            .into_iter()
            .filter_map(|id| self.registry.get_capability(&id))
            .map(AgentMatch::exact)
            .collect()
    }

    /// Discover agents offering a named capability (scan of `provides`).
    pub fn discover_by_capability(&self, capability_name: &str) -> Vec<AgentMatch> {
        self.registry
            .all_capabilities()
            .into_iter()
            .filter(|c| c.provides.iter().any(|p| p == capability_name))
            .map(AgentMatch::exact)
            .collect()
    }

    /// Check schema compatibility between two agents.
    ///
    /// Bidirectional key-presence check: A's output keys must cover B's
    /// input keys and vice versa. Results are cached by unordered pair
    /// until `force_recheck`; lookups against unregistered agents are
    /// reported incompatible and never cached.
    pub fn check_compatibility(
        &self,
        agent_a: &str,
        agent_b: &str,
        force_recheck: bool,
    ) -> CompatibilityResult {
        if !force_recheck {
            if let Some(cached) = self.compatibility.get(agent_a, agent_b) {
                return cached;
            }
        }

        let cap_a = self.registry.get_capability(agent_a);
        let cap_b = self.registry.get_capability(agent_b);
        let (Some(cap_a), Some(cap_b)) = (cap_a, cap_b) else {
            return CompatibilityResult::new(
                agent_a,
                agent_b,
                vec!["One or both agents not registered".to_string()],
            );
        };

        let mut issues = Vec::new();

        let missing_from_a: BTreeSet<&String> = cap_b
            .input_schema
            .keys()
            .filter(|k| !cap_a.output_schema.contains_key(*k))
            .collect();
        if !missing_from_a.is_empty() {
            issues.push(format!(
                "Agent A missing required output fields: {:?}",
                missing_from_a
            ));
        }

        let missing_from_b: BTreeSet<&String> = cap_a
            .input_schema
            .keys()
            .filter(|k| !cap_b.output_schema.contains_key(*k))
            .collect();
        if !missing_from_b.is_empty() {
            issues.push(format!(
                "Agent B missing required output fields: {:?}",
                missing_from_b
            ));
        }

        let result = CompatibilityResult::new(agent_a, agent_b, issues);
        self.compatibility.set(result.clone());
        result
    }

    /// Capability spec for a specific agent version, if it matches.
    pub fn capability_schema(&self, agent_id: &str, version: &str) -> Option<CapabilitySpec> {
        self.registry
            .get_capability(agent_id)
            .filter(|c| c.version == version)
    }

    /// All registered capabilities.
    pub fn list_agents(&self) -> Vec<CapabilitySpec> {
        self.registry.all_capabilities()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        let capabilities = self.registry.all_capabilities();

        let mut domain_distribution: HashMap<String, usize> = HashMap::new();
        let mut intents: BTreeSet<String> = BTreeSet::new();
        for cap in &capabilities {
            *domain_distribution.entry(cap.domain.clone()).or_default() += 1;
            intents.extend(cap.intents.iter().cloned());
        }

        RegistryStats {
            total_agents: capabilities.len(),
            domains: domain_distribution.len(),
            domain_distribution,
            unique_intents: intents.len(),
            intents: intents.into_iter().collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

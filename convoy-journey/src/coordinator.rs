//! Journey coordinator: stores journey states and drives transitions.
//!
//! One `RwLock` over the `client_id -> JourneyState` map; every lifecycle
//! operation revalidates under the write lock and swaps in the new state
//! produced by the state machine.

use crate::state_machine;
use convoy_core::{
    ConvoyResult, JourneyError, JourneyStage, JourneyState, PersistenceError, TransitionEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Progress summary for one journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneySummary {
    pub client_id: String,
    pub current_stage: JourneyStage,
    pub previous_stage: Option<JourneyStage>,
    pub stage_duration_seconds: f64,
    pub total_duration_seconds: f64,
    pub completed_stages: Vec<JourneyStage>,
    pub is_terminal: bool,
    pub available_transitions: Vec<TransitionEvent>,
    pub stage_history_count: usize,
    pub metadata: Map<String, Value>,
}

/// Coordinates client journeys through their lifecycle stages.
#[derive(Debug, Default)]
pub struct JourneyCoordinator {
    journeys: RwLock<HashMap<String, JourneyState>>,
}

impl JourneyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new journey in the sandbox stage.
    pub fn start_journey(
        &self,
        client_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<JourneyState, JourneyError> {
        let mut journeys = self.journeys.write().unwrap();
        if journeys.contains_key(client_id) {
            return Err(JourneyError::AlreadyExists {
                client_id: client_id.to_string(),
            });
        }

        let state = state_machine::start_journey(client_id, metadata);
        journeys.insert(client_id.to_string(), state.clone());
        info!(client_id = %client_id, stage = %state.current_stage, "journey started");
        Ok(state)
    }

    pub fn promote_to_pilot(
        &self,
        client_id: &str,
        reason: &str,
        exit_criteria_results: Option<HashMap<String, bool>>,
    ) -> Result<JourneyState, JourneyError> {
        self.execute_transition(
            client_id,
            TransitionEvent::PromoteToPilot,
            if reason.is_empty() {
                "Sandbox exit criteria met, promoting to pilot"
            } else {
                reason
            },
            exit_criteria_results,
        )
    }

    pub fn promote_to_production(
        &self,
        client_id: &str,
        reason: &str,
        exit_criteria_results: Option<HashMap<String, bool>>,
    ) -> Result<JourneyState, JourneyError> {
        self.execute_transition(
            client_id,
            TransitionEvent::PromoteToProduction,
            if reason.is_empty() {
                "Pilot exit criteria met, promoting to production"
            } else {
                reason
            },
            exit_criteria_results,
        )
    }

    pub fn mark_complete(
        &self,
        client_id: &str,
        reason: &str,
    ) -> Result<JourneyState, JourneyError> {
        self.execute_transition(client_id, TransitionEvent::MarkComplete, reason, None)
    }

    pub fn initiate_rollback(
        &self,
        client_id: &str,
        reason: &str,
    ) -> Result<JourneyState, JourneyError> {
        self.execute_transition(client_id, TransitionEvent::InitiateRollback, reason, None)
    }

    pub fn complete_rollback(
        &self,
        client_id: &str,
        reason: &str,
    ) -> Result<JourneyState, JourneyError> {
        self.execute_transition(client_id, TransitionEvent::CompleteRollback, reason, None)
    }

    pub fn cancel_journey(
        &self,
        client_id: &str,
        reason: &str,
    ) -> Result<JourneyState, JourneyError> {
        self.execute_transition(client_id, TransitionEvent::CancelJourney, reason, None)
    }

    /// Revalidate and apply one transition under the write lock.
    fn execute_transition(
        &self,
        client_id: &str,
        event: TransitionEvent,
        reason: &str,
        exit_criteria_results: Option<HashMap<String, bool>>,
    ) -> Result<JourneyState, JourneyError> {
        let mut journeys = self.journeys.write().unwrap();
        let current = journeys
            .get(client_id)
            .ok_or_else(|| JourneyError::NotFound {
                client_id: client_id.to_string(),
            })?;

        let new_state =
            state_machine::transition(current, event, reason, exit_criteria_results)?;
        info!(
            client_id = %client_id,
            from_stage = %current.current_stage,
            to_stage = %new_state.current_stage,
            event = %event,
            "journey transition"
        );
        journeys.insert(client_id.to_string(), new_state.clone());
        Ok(new_state)
    }

    /// Current state snapshot, if the journey exists.
    pub fn journey_state(&self, client_id: &str) -> Option<JourneyState> {
        self.journeys.read().unwrap().get(client_id).cloned()
    }

    /// Journeys not yet in a terminal stage.
    pub fn active_journeys(&self) -> Vec<JourneyState> {
        self.journeys
            .read()
            .unwrap()
            .values()
            .filter(|s| !s.is_terminal())
            .cloned()
            .collect()
    }

    pub fn journeys_in_stage(&self, stage: JourneyStage) -> Vec<JourneyState> {
        self.journeys
            .read()
            .unwrap()
            .values()
            .filter(|s| s.current_stage == stage)
            .cloned()
            .collect()
    }

    /// Events applicable to the journey's current stage.
    pub fn available_transitions(&self, client_id: &str) -> Result<Vec<TransitionEvent>, JourneyError> {
        let journeys = self.journeys.read().unwrap();
        let state = journeys.get(client_id).ok_or_else(|| JourneyError::NotFound {
            client_id: client_id.to_string(),
        })?;
        Ok(state_machine::available_transitions(state))
    }

    pub fn journey_summary(&self, client_id: &str) -> Result<JourneySummary, JourneyError> {
        let journeys = self.journeys.read().unwrap();
        let state = journeys.get(client_id).ok_or_else(|| JourneyError::NotFound {
            client_id: client_id.to_string(),
        })?;

        Ok(JourneySummary {
            client_id: state.client_id.clone(),
            current_stage: state.current_stage,
            previous_stage: state.previous_stage,
            stage_duration_seconds: state.stage_duration().as_secs_f64(),
            total_duration_seconds: state.total_duration().as_secs_f64(),
            completed_stages: state.completed_stages.clone(),
            is_terminal: state.is_terminal(),
            available_transitions: state_machine::available_transitions(state),
            stage_history_count: state.stage_history.len(),
            metadata: state.metadata.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Persistence contract
    // ------------------------------------------------------------------

    /// Serialize a journey state for external persistence.
    pub fn persist_state(&self, client_id: &str) -> ConvoyResult<String> {
        let journeys = self.journeys.read().unwrap();
        let state = journeys.get(client_id).ok_or(JourneyError::NotFound {
            client_id: client_id.to_string(),
        })?;

        let serialized = serde_json::to_string(state).map_err(|e| PersistenceError::Serialize {
            entity: "JourneyState".to_string(),
            reason: e.to_string(),
        })?;
        Ok(serialized)
    }

    /// Restore a previously persisted journey state.
    ///
    /// Fails if a journey already exists for the same client.
    pub fn restore_state(&self, serialized: &str) -> ConvoyResult<JourneyState> {
        let state: JourneyState =
            serde_json::from_str(serialized).map_err(|e| PersistenceError::Deserialize {
                entity: "JourneyState".to_string(),
                reason: e.to_string(),
            })?;

        let mut journeys = self.journeys.write().unwrap();
        if journeys.contains_key(&state.client_id) {
            return Err(JourneyError::AlreadyExists {
                client_id: state.client_id.clone(),
            }
            .into());
        }

        info!(client_id = %state.client_id, stage = %state.current_stage, "journey restored");
        journeys.insert(state.client_id.clone(), state.clone());
        Ok(state)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started(coordinator: &JourneyCoordinator, client_id: &str) {
        coordinator.start_journey(client_id, Map::new()).unwrap();
    }

    #[test]
    fn test_duplicate_journey_rejected() {
        let coordinator = JourneyCoordinator::new();
        started(&coordinator, "acme");
        let err = coordinator.start_journey("acme", Map::new()).unwrap_err();
        assert!(matches!(err, JourneyError::AlreadyExists { .. }));
    }

    #[test]
    fn test_transition_on_unknown_client() {
        let coordinator = JourneyCoordinator::new();
        let err = coordinator.promote_to_pilot("ghost", "", None).unwrap_err();
        assert!(matches!(err, JourneyError::NotFound { .. }));
    }

    #[test]
    fn test_full_lifecycle() {
        let coordinator = JourneyCoordinator::new();
        started(&coordinator, "acme");

        coordinator.promote_to_pilot("acme", "", None).unwrap();
        coordinator.promote_to_production("acme", "", None).unwrap();
        let state = coordinator.mark_complete("acme", "go-live done").unwrap();

        assert_eq!(state.current_stage, JourneyStage::Completed);
        assert!(coordinator.active_journeys().is_empty());
    }

    #[test]
    fn test_rollback_from_pilot_returns_to_pilot() {
        let coordinator = JourneyCoordinator::new();
        started(&coordinator, "acme");
        coordinator.promote_to_pilot("acme", "", None).unwrap();

        let state = coordinator
            .initiate_rollback("acme", "pilot defect found")
            .unwrap();
        assert_eq!(state.current_stage, JourneyStage::Rollback);

        let state = coordinator.complete_rollback("acme", "").unwrap();
        assert_eq!(state.current_stage, JourneyStage::Pilot);
    }

    #[test]
    fn test_stage_queries() {
        let coordinator = JourneyCoordinator::new();
        started(&coordinator, "acme");
        started(&coordinator, "globex");
        coordinator.promote_to_pilot("globex", "", None).unwrap();

        assert_eq!(coordinator.journeys_in_stage(JourneyStage::Sandbox).len(), 1);
        assert_eq!(coordinator.journeys_in_stage(JourneyStage::Pilot).len(), 1);
        assert_eq!(coordinator.active_journeys().len(), 2);
    }

    #[test]
    fn test_available_transitions_shrink_at_terminal() {
        let coordinator = JourneyCoordinator::new();
        started(&coordinator, "acme");
        assert_eq!(
            coordinator.available_transitions("acme").unwrap(),
            vec![
                TransitionEvent::PromoteToPilot,
                TransitionEvent::InitiateRollback,
                TransitionEvent::CancelJourney,
            ]
        );

        coordinator.cancel_journey("acme", "churned").unwrap();
        assert!(coordinator.available_transitions("acme").unwrap().is_empty());
    }

    #[test]
    fn test_journey_summary() {
        let coordinator = JourneyCoordinator::new();
        let mut metadata = Map::new();
        metadata.insert("contract".to_string(), json!("ent-42"));
        coordinator.start_journey("acme", metadata).unwrap();
        coordinator.promote_to_pilot("acme", "", None).unwrap();

        let summary = coordinator.journey_summary("acme").unwrap();
        assert_eq!(summary.current_stage, JourneyStage::Pilot);
        assert_eq!(summary.previous_stage, Some(JourneyStage::Sandbox));
        assert_eq!(summary.completed_stages, vec![JourneyStage::Sandbox]);
        assert!(!summary.is_terminal);
        assert_eq!(summary.stage_history_count, 2);
        assert_eq!(summary.metadata["contract"], "ent-42");
    }

    #[test]
    fn test_persist_and_restore_roundtrip() {
        let source = JourneyCoordinator::new();
        started(&source, "acme");
        source.promote_to_pilot("acme", "", None).unwrap();
        let serialized = source.persist_state("acme").unwrap();

        let target = JourneyCoordinator::new();
        let restored = target.restore_state(&serialized).unwrap();
        assert_eq!(restored.current_stage, JourneyStage::Pilot);
        assert_eq!(
            target.journey_state("acme").unwrap(),
            source.journey_state("acme").unwrap()
        );
    }

    #[test]
    fn test_restore_existing_client_rejected() {
        let coordinator = JourneyCoordinator::new();
        started(&coordinator, "acme");
        let serialized = coordinator.persist_state("acme").unwrap();

        let err = coordinator.restore_state(&serialized).unwrap_err();
        assert!(matches!(
            err,
            convoy_core::ConvoyError::Journey(JourneyError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_restore_garbage_fails_with_deserialize_error() {
        let coordinator = JourneyCoordinator::new();
        let err = coordinator.restore_state("{not json").unwrap_err();
        assert!(matches!(
            err,
            convoy_core::ConvoyError::Persistence(PersistenceError::Deserialize { .. })
        ));
    }
}

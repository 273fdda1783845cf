//! Journey lifecycle state machine.
//!
//! Pure transition logic over [`JourneyState`] values: a static transition
//! table, copy-on-transition semantics, and an append-only audit history.
//! All storage and locking lives in the coordinator.

use chrono::Utc;
use convoy_core::{
    JourneyError, JourneyStage, JourneyState, StageTransition, TransitionEvent,
};
use serde_json::Map;
use std::collections::HashMap;

/// Where a transition lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionTarget {
    Stage(JourneyStage),
    /// Resolved from the state's `previous_stage` at transition time
    PreviousStage,
}

/// The transition table: `(current stage, event) -> target`.
///
/// `None` as the source stage means "no journey yet"; only `StartJourney`
/// applies there. Terminal stages have no outgoing entries.
fn transition_target(
    stage: Option<JourneyStage>,
    event: TransitionEvent,
) -> Option<TransitionTarget> {
    use JourneyStage::*;
    use TransitionEvent::*;
    use TransitionTarget::*;

    let target = match (stage, event) {
        (None, StartJourney) => Stage(Sandbox),

        // Forward progression
        (Some(Sandbox), PromoteToPilot) => Stage(Pilot),
        (Some(Pilot), PromoteToProduction) => Stage(Production),
        (Some(Production), MarkComplete) => Stage(Completed),

        // Rollback from any active stage; completion resolves dynamically
        (Some(Sandbox | Pilot | Production), InitiateRollback) => Stage(Rollback),
        (Some(Rollback), CompleteRollback) => PreviousStage,

        // Cancellation from any non-terminal stage
        (Some(Sandbox | Pilot | Production | Rollback), CancelJourney) => Stage(Cancelled),

        _ => return None,
    };
    Some(target)
}

/// Events that record forward progress: the stage being left is appended to
/// `completed_stages`.
fn is_forward_event(event: TransitionEvent) -> bool {
    matches!(
        event,
        TransitionEvent::PromoteToPilot
            | TransitionEvent::PromoteToProduction
            | TransitionEvent::MarkComplete
    )
}

/// Start a new journey in the sandbox stage.
pub fn start_journey(
    client_id: impl Into<String>,
    metadata: Map<String, serde_json::Value>,
) -> JourneyState {
    let now = Utc::now();
    JourneyState {
        client_id: client_id.into(),
        current_stage: JourneyStage::Sandbox,
        previous_stage: None,
        started_at: now,
        stage_started_at: now,
        completed_stages: Vec::new(),
        stage_history: vec![StageTransition {
            from_stage: None,
            to_stage: JourneyStage::Sandbox,
            transitioned_at: now,
            reason: "Journey started".to_string(),
            exit_criteria_results: None,
        }],
        metadata,
    }
}

/// Apply a transition event to a journey state.
///
/// Returns a new state; the input is never mutated, so holders of the old
/// snapshot are unaffected. Fails with [`JourneyError::InvalidTransition`]
/// when the table has no entry, or [`JourneyError::NoPreviousStage`] when a
/// rollback completes without a recorded origin.
pub fn transition(
    state: &JourneyState,
    event: TransitionEvent,
    reason: impl Into<String>,
    exit_criteria_results: Option<HashMap<String, bool>>,
) -> Result<JourneyState, JourneyError> {
    let target = transition_target(Some(state.current_stage), event).ok_or_else(|| {
        JourneyError::InvalidTransition {
            stage: state.current_stage.to_string(),
            event: event.to_string(),
        }
    })?;

    let target_stage = match target {
        TransitionTarget::Stage(stage) => stage,
        TransitionTarget::PreviousStage => {
            state
                .previous_stage
                .ok_or_else(|| JourneyError::NoPreviousStage {
                    client_id: state.client_id.clone(),
                })?
        }
    };

    let now = Utc::now();
    let reason = {
        let reason = reason.into();
        if reason.is_empty() {
            format!("Transition to {}", target_stage)
        } else {
            reason
        }
    };

    let mut completed_stages = state.completed_stages.clone();
    if is_forward_event(event) {
        completed_stages.push(state.current_stage);
    }

    let mut stage_history = state.stage_history.clone();
    stage_history.push(StageTransition {
        from_stage: Some(state.current_stage),
        to_stage: target_stage,
        transitioned_at: now,
        reason,
        exit_criteria_results,
    });

    Ok(JourneyState {
        client_id: state.client_id.clone(),
        current_stage: target_stage,
        previous_stage: Some(state.current_stage),
        started_at: state.started_at,
        stage_started_at: now,
        completed_stages,
        stage_history,
        metadata: state.metadata.clone(),
    })
}

/// Check whether an event applies to the current stage, without executing.
pub fn can_transition(state: &JourneyState, event: TransitionEvent) -> bool {
    transition_target(Some(state.current_stage), event).is_some()
}

/// Events applicable from the current stage.
pub fn available_transitions(state: &JourneyState) -> Vec<TransitionEvent> {
    TransitionEvent::ALL
        .into_iter()
        .filter(|e| can_transition(state, *e))
        .collect()
}

/// Check if the journey has reached a terminal stage.
pub fn is_terminal_state(state: &JourneyState) -> bool {
    state.is_terminal()
}

// =============================================================================
// TESTS
// =============================================================================

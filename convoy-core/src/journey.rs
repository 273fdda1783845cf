//! Client journey lifecycle types.
//!
//! A journey is a client's ordered progression through sandbox, pilot, and
//! production stages. State values are immutable: every transition yields a
//! new `JourneyState` and appends to the audit history.

use crate::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// STAGES AND EVENTS
// ============================================================================

/// Journey stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JourneyStage {
    Sandbox,
    Pilot,
    Production,
    /// Transient state while a rollback is underway
    Rollback,
    /// Terminal success state
    Completed,
    /// Terminal failure state
    Cancelled,
}

impl JourneyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyStage::Sandbox => "sandbox",
            JourneyStage::Pilot => "pilot",
            JourneyStage::Production => "production",
            JourneyStage::Rollback => "rollback",
            JourneyStage::Completed => "completed",
            JourneyStage::Cancelled => "cancelled",
        }
    }

    /// Check if this stage is terminal (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JourneyStage::Completed | JourneyStage::Cancelled)
    }

    /// All stages, in lifecycle order.
    pub const ALL: [JourneyStage; 6] = [
        JourneyStage::Sandbox,
        JourneyStage::Pilot,
        JourneyStage::Production,
        JourneyStage::Rollback,
        JourneyStage::Completed,
        JourneyStage::Cancelled,
    ];
}

impl fmt::Display for JourneyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JourneyStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(JourneyStage::Sandbox),
            "pilot" => Ok(JourneyStage::Pilot),
            "production" => Ok(JourneyStage::Production),
            "rollback" => Ok(JourneyStage::Rollback),
            "completed" => Ok(JourneyStage::Completed),
            "cancelled" => Ok(JourneyStage::Cancelled),
            _ => Err(format!("Invalid journey stage: {}", s)),
        }
    }
}

/// Events that trigger journey stage transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    StartJourney,
    PromoteToPilot,
    PromoteToProduction,
    InitiateRollback,
    CompleteRollback,
    CancelJourney,
    MarkComplete,
}

impl TransitionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionEvent::StartJourney => "start_journey",
            TransitionEvent::PromoteToPilot => "promote_to_pilot",
            TransitionEvent::PromoteToProduction => "promote_to_production",
            TransitionEvent::InitiateRollback => "initiate_rollback",
            TransitionEvent::CompleteRollback => "complete_rollback",
            TransitionEvent::CancelJourney => "cancel_journey",
            TransitionEvent::MarkComplete => "mark_complete",
        }
    }

    /// All events.
    pub const ALL: [TransitionEvent; 7] = [
        TransitionEvent::StartJourney,
        TransitionEvent::PromoteToPilot,
        TransitionEvent::PromoteToProduction,
        TransitionEvent::InitiateRollback,
        TransitionEvent::CompleteRollback,
        TransitionEvent::CancelJourney,
        TransitionEvent::MarkComplete,
    ];
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Append-only record of one stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    /// None for the initial transition into sandbox
    pub from_stage: Option<JourneyStage>,
    pub to_stage: JourneyStage,
    pub transitioned_at: Timestamp,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_criteria_results: Option<HashMap<String, bool>>,
}

// ============================================================================
// JOURNEY STATE
// ============================================================================

/// Current state of a client journey.
///
/// Copy-on-transition: holders of an old snapshot are never affected by
/// later transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyState {
    pub client_id: String,
    pub current_stage: JourneyStage,
    pub previous_stage: Option<JourneyStage>,
    pub started_at: Timestamp,
    pub stage_started_at: Timestamp,
    /// Stages completed by forward progression, in order
    pub completed_stages: Vec<JourneyStage>,
    pub stage_history: Vec<StageTransition>,
    pub metadata: Map<String, Value>,
}

impl JourneyState {
    /// Time spent in the current stage.
    pub fn stage_duration(&self) -> Duration {
        (Utc::now() - self.stage_started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Total journey duration so far.
    pub fn total_duration(&self) -> Duration {
        (Utc::now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage.is_terminal()
    }
}

// =============================================================================
// TESTS
// =============================================================================

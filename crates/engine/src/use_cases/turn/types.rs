//! Turn configuration, results and errors.

use std::time::Duration;

use serde::Serialize;
use taleweaver_domain::{BeatId, DomainEvent, MediaJobId, SessionId, StateSummary, TimeProgression};

use crate::infrastructure::llm_manager::{ProviderHealth, ResponseSchema};
use crate::use_cases::quest::QuestTransition;

#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub time: TimeProgression,
    /// Largest affinity change a single narrator response may cause per companion.
    pub max_affinity_delta: i32,
    pub persist_timeout: Duration,
    pub max_input_chars: usize,
    /// Exchanges kept in state and replayed to the narrator.
    pub history_limit: usize,
    pub schema: ResponseSchema,
    pub image_width: u32,
    pub image_height: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            time: TimeProgression::default(),
            max_affinity_delta: 5,
            persist_timeout: Duration::from_secs(5),
            max_input_chars: 2000,
            history_limit: 10,
            schema: ResponseSchema::default(),
            image_width: 768,
            image_height: 768,
        }
    }
}

/// What happened to the scene image for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaOutcome {
    /// Rendering in the background; poll with the job id.
    Pending { job_id: MediaJobId },
    /// The pipeline refused the job. The turn itself is unaffected.
    Unavailable { reason: String },
    /// No pipeline configured, or nothing to render.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub session_id: SessionId,
    pub turn: u64,
    pub narrative: String,
    /// Provider that produced the narrative; `None` when degraded.
    pub provider: Option<String>,
    /// True when every provider failed and the fallback narrative was used.
    pub degraded: bool,
    pub state: StateSummary,
    pub events: Vec<DomainEvent>,
    pub fired_beat: Option<BeatId>,
    /// Visible quest changes only.
    pub quest_transitions: Vec<QuestTransition>,
    pub media: MediaOutcome,
}

/// Readiness of the services a turn depends on.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub providers: Vec<ProviderHealth>,
    /// `None` when no media pipeline is configured.
    pub media: Option<bool>,
}

impl HealthReport {
    /// At least one provider can narrate. Media never affects readiness.
    pub fn is_ready(&self) -> bool {
        self.providers.iter().any(|p| p.healthy)
    }
}

/// The only errors a turn surfaces. Everything else degrades.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("A turn is already in progress for session {0}")]
    TurnInProgress(SessionId),
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("Could not persist session: {0}")]
    Persistence(String),
}

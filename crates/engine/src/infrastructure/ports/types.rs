//! Data carried across port boundaries.

use serde::{Deserialize, Serialize};
use taleweaver_domain::{
    BeatId, CompanionId, Exchange, LocationId, MediaJobId, QuestId, StateSummary,
};

// =============================================================================
// Prompt Context
// =============================================================================

/// Everything the prompt builder may draw on for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub world_title: String,
    pub world_description: String,
    pub player_input: String,
    pub state: StateSummary,
    pub location: LocationInfo,
    pub companion: Option<CompanionInfo>,
    pub quests: Vec<QuestContext>,
    pub narrative: NarrativeContext,
    /// Present when a story beat fired this turn.
    pub directive: Option<BeatDirective>,
    /// Earlier exchanges, oldest first.
    pub history: Vec<Exchange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationInfo {
    pub id: LocationId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanionInfo {
    pub id: CompanionId,
    pub name: String,
    pub description: String,
    pub affinity: i32,
}

/// Narrator guidance for one visible, active quest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestContext {
    pub quest_id: QuestId,
    pub title: String,
    pub stage: u32,
    pub total_stages: u32,
    pub narrative_prompt: String,
}

/// Story framing that applies on every turn, beat or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NarrativeContext {
    pub arcs: Vec<ArcSummary>,
    pub hard_limits: Vec<String>,
    /// Descriptions of the most recently fired beats, oldest first.
    pub recent_beats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcSummary {
    pub title: String,
    pub premise: String,
    pub themes: Vec<String>,
}

/// What the narrator must do because a beat fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeatDirective {
    pub beat_id: BeatId,
    pub description: String,
    pub tone: Option<String>,
    pub required_elements: Vec<String>,
    pub hard_limits: Vec<String>,
}

// =============================================================================
// Gameplay
// =============================================================================

/// Input to gameplay heuristics, taken after the narrative is known.
#[derive(Debug, Clone, PartialEq)]
pub struct GameplayContext {
    pub turn: u64,
    pub player_input: String,
    pub narrative: String,
    pub location: LocationId,
    pub active_companion: Option<CompanionId>,
}

// =============================================================================
// Media
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub job_id: MediaJobId,
    pub prompt: String,
    pub tags: Vec<String>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaArtifact {
    pub path: String,
    pub format: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaStatus {
    Pending,
    Ready { artifact: MediaArtifact },
    Failed { reason: String },
    Cancelled,
}

impl MediaStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MediaStatus::Pending)
    }
}

//! Story beats and the narrative arcs they build.

use serde::{Deserialize, Serialize};

use crate::ids::{ArcId, BeatId};
use crate::rules::{Action, Condition};

/// A narrative moment that fires when its trigger holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryBeat {
    pub id: BeatId,
    #[serde(default)]
    pub description: String,
    pub trigger: Condition,
    /// Higher fires first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub tone: Option<String>,
    /// Things the narration must mention when this beat fires.
    #[serde(default)]
    pub required_elements: Vec<String>,
    #[serde(default)]
    pub consequences: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeArc {
    pub id: ArcId,
    pub title: String,
    #[serde(default)]
    pub premise: String,
    #[serde(default)]
    pub themes: Vec<String>,
    pub required_beats: Vec<BeatId>,
    #[serde(default)]
    pub completion_actions: Vec<Action>,
}

impl NarrativeArc {
    pub fn contains(&self, beat: &BeatId) -> bool {
        self.required_beats.contains(beat)
    }
}

//! Static quest definitions loaded from world content.

use serde::{Deserialize, Serialize};

use crate::ids::{QuestId, StageId};
use crate::rules::{Action, Condition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDefinition {
    pub id: QuestId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Hidden quests progress normally but are never shown to the player or
    /// mentioned in prompts.
    #[serde(default)]
    pub hidden: bool,
    /// Manual quests ignore `start_condition` and start only via a
    /// `start_quest` action.
    #[serde(default)]
    pub manual_start: bool,
    /// Quests that must be completed before this one may start.
    #[serde(default)]
    pub required_quests: Vec<QuestId>,
    #[serde(default)]
    pub start_condition: Condition,
    pub stages: Vec<QuestStage>,
    /// Applied once when the final stage completes.
    #[serde(default)]
    pub rewards: Vec<Action>,
}

impl QuestDefinition {
    pub fn stage_count(&self) -> u32 {
        u32::try_from(self.stages.len()).unwrap_or(u32::MAX)
    }

    /// Stage at a 1-based cursor.
    pub fn stage(&self, cursor: u32) -> Option<&QuestStage> {
        let index = usize::try_from(cursor).ok()?.checked_sub(1)?;
        self.stages.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestStage {
    pub id: StageId,
    /// Guidance handed to the narrator while this stage is active.
    #[serde(default)]
    pub narrative_prompt: String,
    #[serde(default)]
    pub entry_actions: Vec<Action>,
    pub completion: Condition,
    #[serde(default)]
    pub completion_actions: Vec<Action>,
    #[serde(default)]
    pub fail_condition: Option<Condition>,
    #[serde(default)]
    pub fail_actions: Vec<Action>,
}

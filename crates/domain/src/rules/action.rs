//! State mutations declared by world content, story beats, and the gameplay layer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::game_time::TimeOfDay;
use crate::ids::{CompanionId, ItemId, LocationId, QuestId};
use crate::state::FlagValue;
use crate::world::WorldCatalog;

fn one() -> u32 {
    1
}

/// A single state change. Applied only through [`super::ActionExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SetFlag {
        flag: String,
        value: FlagValue,
    },
    IncrementStat {
        stat: String,
        amount: i64,
    },
    ModifyAffinity {
        target: CompanionId,
        delta: i32,
    },
    GiveItem {
        item: ItemId,
        #[serde(default = "one")]
        count: u32,
    },
    RemoveItem {
        item: ItemId,
        #[serde(default = "one")]
        count: u32,
    },
    StartQuest {
        quest: QuestId,
    },
    AdvanceQuestStage {
        quest: QuestId,
    },
    CompleteQuest {
        quest: QuestId,
    },
    FailQuest {
        quest: QuestId,
    },
    /// The only way a quest's stage cursor moves backwards.
    ResetQuest {
        quest: QuestId,
    },
    TriggerGlobalEvent {
        event: String,
    },
    UnlockLocation {
        location: LocationId,
    },
    SetLocation {
        location: LocationId,
    },
    SetTimeOfDay {
        time: TimeOfDay,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetFlag { .. } => "set_flag",
            Action::IncrementStat { .. } => "increment_stat",
            Action::ModifyAffinity { .. } => "modify_affinity",
            Action::GiveItem { .. } => "give_item",
            Action::RemoveItem { .. } => "remove_item",
            Action::StartQuest { .. } => "start_quest",
            Action::AdvanceQuestStage { .. } => "advance_quest_stage",
            Action::CompleteQuest { .. } => "complete_quest",
            Action::FailQuest { .. } => "fail_quest",
            Action::ResetQuest { .. } => "reset_quest",
            Action::TriggerGlobalEvent { .. } => "trigger_global_event",
            Action::UnlockLocation { .. } => "unlock_location",
            Action::SetLocation { .. } => "set_location",
            Action::SetTimeOfDay { .. } => "set_time_of_day",
        }
    }

    pub fn set_flag(flag: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        Action::SetFlag {
            flag: flag.into(),
            value: value.into(),
        }
    }

    pub fn modify_affinity(target: impl Into<CompanionId>, delta: i32) -> Self {
        Action::ModifyAffinity {
            target: target.into(),
            delta,
        }
    }

    pub fn give_item(item: impl Into<ItemId>, count: u32) -> Self {
        Action::GiveItem {
            item: item.into(),
            count,
        }
    }

    pub fn remove_item(item: impl Into<ItemId>, count: u32) -> Self {
        Action::RemoveItem {
            item: item.into(),
            count,
        }
    }

    /// Checks that every reference in an authored action names something the
    /// world defines.
    pub fn validate(&self, path: &str, catalog: &WorldCatalog, errors: &mut Vec<ValidationError>) {
        match self {
            Action::SetFlag { flag, .. } if flag.trim().is_empty() => {
                errors.push(ValidationError::invalid(path, "flag name is empty"));
            }
            Action::IncrementStat { stat, .. } if stat.trim().is_empty() => {
                errors.push(ValidationError::invalid(path, "stat name is empty"));
            }
            Action::ModifyAffinity { target, .. } if !catalog.has_companion(target.as_str()) => {
                errors.push(ValidationError::unknown(path, "companion", target.as_str()));
            }
            Action::GiveItem { item, .. } | Action::RemoveItem { item, .. }
                if !catalog.has_item(item.as_str()) =>
            {
                errors.push(ValidationError::unknown(path, "item", item.as_str()));
            }
            Action::StartQuest { quest }
            | Action::AdvanceQuestStage { quest }
            | Action::CompleteQuest { quest }
            | Action::FailQuest { quest }
            | Action::ResetQuest { quest }
                if !catalog.has_quest(quest.as_str()) =>
            {
                errors.push(ValidationError::unknown(path, "quest", quest.as_str()));
            }
            Action::UnlockLocation { location } | Action::SetLocation { location }
                if !catalog.has_location(location.as_str()) =>
            {
                errors.push(ValidationError::unknown(path, "location", location.as_str()));
            }
            _ => {}
        }
    }
}

pub(crate) fn validate_all(
    actions: &[Action],
    path: &str,
    catalog: &WorldCatalog,
    errors: &mut Vec<ValidationError>,
) {
    for (i, action) in actions.iter().enumerate() {
        action.validate(&format!("{path}[{i}]"), catalog, errors);
    }
}

//! Domain Events
//!
//! Fine-grained record of what a turn changed. Rule components return these
//! instead of logging, and the engine forwards them to the caller with the
//! turn result.

use serde::{Deserialize, Serialize};

use crate::game_time::TimeOfDay;
use crate::ids::{ArcId, BeatId, CompanionId, ItemId, LocationId, QuestId};
use crate::state::FlagValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // State
    FlagSet {
        flag: String,
        value: FlagValue,
    },
    StatChanged {
        stat: String,
        from: i64,
        to: i64,
    },
    AffinityChanged {
        companion: CompanionId,
        from: i32,
        to: i32,
    },
    ItemGained {
        item: ItemId,
        count: u32,
        total: u32,
    },
    ItemRemoved {
        item: ItemId,
        count: u32,
        total: u32,
    },
    LocationUnlocked {
        location: LocationId,
    },
    LocationChanged {
        from: LocationId,
        to: LocationId,
    },
    TimeOfDayChanged {
        from: TimeOfDay,
        to: TimeOfDay,
    },
    GlobalEventTriggered {
        event: String,
    },

    // Quests
    QuestStarted {
        quest: QuestId,
    },
    QuestStageAdvanced {
        quest: QuestId,
        from_stage: u32,
        to_stage: u32,
    },
    QuestCompleted {
        quest: QuestId,
    },
    QuestFailed {
        quest: QuestId,
    },
    QuestReset {
        quest: QuestId,
    },

    // Narrative
    BeatFired {
        beat: BeatId,
        turn: u64,
    },
    ArcCompleted {
        arc: ArcId,
    },

    /// An action was skipped because its target is unknown or the transition
    /// is not allowed. The rest of its batch still applied.
    ActionApplicationWarning {
        action: String,
        reason: String,
    },
}

impl DomainEvent {
    pub fn warning(action: &str, reason: impl Into<String>) -> Self {
        DomainEvent::ActionApplicationWarning {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, DomainEvent::ActionApplicationWarning { .. })
    }

    /// Returns the event type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::FlagSet { .. } => "flag_set",
            DomainEvent::StatChanged { .. } => "stat_changed",
            DomainEvent::AffinityChanged { .. } => "affinity_changed",
            DomainEvent::ItemGained { .. } => "item_gained",
            DomainEvent::ItemRemoved { .. } => "item_removed",
            DomainEvent::LocationUnlocked { .. } => "location_unlocked",
            DomainEvent::LocationChanged { .. } => "location_changed",
            DomainEvent::TimeOfDayChanged { .. } => "time_of_day_changed",
            DomainEvent::GlobalEventTriggered { .. } => "global_event_triggered",
            DomainEvent::QuestStarted { .. } => "quest_started",
            DomainEvent::QuestStageAdvanced { .. } => "quest_stage_advanced",
            DomainEvent::QuestCompleted { .. } => "quest_completed",
            DomainEvent::QuestFailed { .. } => "quest_failed",
            DomainEvent::QuestReset { .. } => "quest_reset",
            DomainEvent::BeatFired { .. } => "beat_fired",
            DomainEvent::ArcCompleted { .. } => "arc_completed",
            DomainEvent::ActionApplicationWarning { .. } => "action_application_warning",
        }
    }
}

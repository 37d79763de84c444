//! Applies [`Action`] batches to a [`GameState`].
//!
//! Batches are best-effort: an action aimed at something the world does not
//! define, or a quest transition that is not allowed right now, is skipped and
//! reported as [`DomainEvent::ActionApplicationWarning`]. Actions already
//! applied stay applied.

use crate::events::DomainEvent;
use crate::ids::QuestId;
use crate::state::{GameState, QuestRuntimeState, QuestStatus, AFFINITY_MAX, AFFINITY_MIN};
use crate::world::WorldCatalog;

use super::action::Action;

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionExecutor;

impl ActionExecutor {
    /// Applies `actions` in order and returns what changed.
    pub fn execute(
        actions: &[Action],
        state: &mut GameState,
        catalog: &WorldCatalog,
    ) -> Vec<DomainEvent> {
        let mut events = Vec::with_capacity(actions.len());
        for action in actions {
            Self::apply(action, state, catalog, &mut events);
        }
        events
    }

    pub fn apply(
        action: &Action,
        state: &mut GameState,
        catalog: &WorldCatalog,
        events: &mut Vec<DomainEvent>,
    ) {
        let kind = action.kind();
        match action {
            Action::SetFlag { flag, value } => {
                state.flags.insert(flag.clone(), *value);
                events.push(DomainEvent::FlagSet {
                    flag: flag.clone(),
                    value: *value,
                });
            }

            Action::IncrementStat { stat, amount } => {
                let entry = state.stats.entry(stat.clone()).or_insert(0);
                let from = *entry;
                *entry = from.saturating_add(*amount);
                events.push(DomainEvent::StatChanged {
                    stat: stat.clone(),
                    from,
                    to: *entry,
                });
            }

            Action::ModifyAffinity { target, delta } => {
                if !catalog.has_companion(target.as_str()) {
                    events.push(DomainEvent::warning(
                        kind,
                        format!("unknown companion '{target}'"),
                    ));
                    return;
                }
                let entry = state.affinity.entry(target.clone()).or_insert(0);
                let from = *entry;
                *entry = from.saturating_add(*delta).clamp(AFFINITY_MIN, AFFINITY_MAX);
                events.push(DomainEvent::AffinityChanged {
                    companion: target.clone(),
                    from,
                    to: *entry,
                });
            }

            Action::GiveItem { item, count } => {
                if !catalog.has_item(item.as_str()) {
                    events.push(DomainEvent::warning(kind, format!("unknown item '{item}'")));
                    return;
                }
                if *count == 0 {
                    return;
                }
                let entry = state.inventory.entry(item.clone()).or_insert(0);
                *entry = entry.saturating_add(*count);
                events.push(DomainEvent::ItemGained {
                    item: item.clone(),
                    count: *count,
                    total: *entry,
                });
            }

            Action::RemoveItem { item, count } => {
                if !catalog.has_item(item.as_str()) {
                    events.push(DomainEvent::warning(kind, format!("unknown item '{item}'")));
                    return;
                }
                let held = state.item_count(item);
                if held == 0 {
                    events.push(DomainEvent::warning(kind, format!("'{item}' is not held")));
                    return;
                }
                let removed = held.min(*count);
                let total = held - removed;
                if total == 0 {
                    state.inventory.remove(item);
                } else {
                    state.inventory.insert(item.clone(), total);
                }
                events.push(DomainEvent::ItemRemoved {
                    item: item.clone(),
                    count: removed,
                    total,
                });
            }

            Action::StartQuest { quest }
            | Action::AdvanceQuestStage { quest }
            | Action::CompleteQuest { quest }
            | Action::FailQuest { quest }
            | Action::ResetQuest { quest } => {
                Self::apply_quest_control(action, quest, state, catalog, events);
            }

            Action::TriggerGlobalEvent { event } => {
                if !state.global_events.contains(event) {
                    state.global_events.push(event.clone());
                }
                events.push(DomainEvent::GlobalEventTriggered {
                    event: event.clone(),
                });
            }

            Action::UnlockLocation { location } => {
                if !catalog.has_location(location.as_str()) {
                    events.push(DomainEvent::warning(
                        kind,
                        format!("unknown location '{location}'"),
                    ));
                    return;
                }
                if state.unlocked_locations.insert(location.clone()) {
                    events.push(DomainEvent::LocationUnlocked {
                        location: location.clone(),
                    });
                }
            }

            Action::SetLocation { location } => {
                if !catalog.has_location(location.as_str()) {
                    events.push(DomainEvent::warning(
                        kind,
                        format!("unknown location '{location}'"),
                    ));
                    return;
                }
                if &state.location == location {
                    return;
                }
                let from = std::mem::replace(&mut state.location, location.clone());
                state.unlocked_locations.insert(location.clone());
                events.push(DomainEvent::LocationChanged {
                    from,
                    to: location.clone(),
                });
            }

            Action::SetTimeOfDay { time } => {
                if state.time_of_day == *time {
                    return;
                }
                let from = state.time_of_day;
                state.time_of_day = *time;
                events.push(DomainEvent::TimeOfDayChanged { from, to: *time });
            }
        }
    }

    fn apply_quest_control(
        action: &Action,
        quest: &QuestId,
        state: &mut GameState,
        catalog: &WorldCatalog,
        events: &mut Vec<DomainEvent>,
    ) {
        let kind = action.kind();
        let Some(stage_count) = catalog.quest_stage_count(quest) else {
            events.push(DomainEvent::warning(kind, format!("unknown quest '{quest}'")));
            return;
        };

        let turn = state.turn;
        if state.quest(quest).is_none() {
            state.quests.push(QuestRuntimeState::new(quest.clone()));
        }
        let Some(record) = state.quest_mut(quest) else {
            return;
        };

        if record.transitioned_on(turn) {
            events.push(DomainEvent::warning(
                kind,
                format!("quest '{quest}' already changed this turn"),
            ));
            return;
        }

        let illegal = |status: QuestStatus| {
            DomainEvent::warning(kind, format!("quest '{quest}' is {status}"))
        };

        match action {
            Action::StartQuest { .. } => {
                if record.status != QuestStatus::NotStarted {
                    events.push(illegal(record.status));
                    return;
                }
                record.start(turn);
                events.push(DomainEvent::QuestStarted {
                    quest: quest.clone(),
                });
            }
            Action::AdvanceQuestStage { .. } => {
                if record.status != QuestStatus::Active {
                    events.push(illegal(record.status));
                    return;
                }
                if record.stage < stage_count {
                    let from_stage = record.stage;
                    record.advance(turn);
                    events.push(DomainEvent::QuestStageAdvanced {
                        quest: quest.clone(),
                        from_stage,
                        to_stage: record.stage,
                    });
                } else {
                    record.complete(turn);
                    events.push(DomainEvent::QuestCompleted {
                        quest: quest.clone(),
                    });
                }
            }
            Action::CompleteQuest { .. } => {
                if record.status != QuestStatus::Active {
                    events.push(illegal(record.status));
                    return;
                }
                record.complete(turn);
                events.push(DomainEvent::QuestCompleted {
                    quest: quest.clone(),
                });
            }
            Action::FailQuest { .. } => {
                if record.status != QuestStatus::Active {
                    events.push(illegal(record.status));
                    return;
                }
                record.fail(turn);
                events.push(DomainEvent::QuestFailed {
                    quest: quest.clone(),
                });
            }
            Action::ResetQuest { .. } => {
                if record.status == QuestStatus::NotStarted {
                    events.push(illegal(record.status));
                    return;
                }
                record.reset(turn);
                events.push(DomainEvent::QuestReset {
                    quest: quest.clone(),
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CompanionId, ItemId, LocationId, SessionId, WorldKey};
    use crate::state::FlagValue;
    use chrono::Utc;

    fn catalog() -> WorldCatalog {
        WorldCatalog::builder()
            .companion("luna")
            .item("lantern")
            .location("library")
            .location("tower")
            .quest("intro", 2)
            .build()
    }

    fn state() -> GameState {
        let mut state = GameState::new(
            SessionId::new(),
            WorldKey::new("w"),
            LocationId::new("library"),
            Utc::now(),
        );
        state.turn = 1;
        state.quests.push(QuestRuntimeState::new(QuestId::new("intro")));
        state
    }

    fn quest(id: &str) -> QuestId {
        QuestId::new(id)
    }

    #[test]
    fn affinity_clamps_to_bounds() {
        let mut state = state();
        let luna = CompanionId::new("luna");

        ActionExecutor::execute(&[Action::modify_affinity("luna", 150)], &mut state, &catalog());
        assert_eq!(state.affinity_of(&luna), 100);

        ActionExecutor::execute(&[Action::modify_affinity("luna", -500)], &mut state, &catalog());
        assert_eq!(state.affinity_of(&luna), -100);
    }

    #[test]
    fn remove_item_never_goes_negative_and_drops_entry() {
        let mut state = state();
        let lantern = ItemId::new("lantern");

        let events = ActionExecutor::execute(
            &[
                Action::give_item("lantern", 2),
                Action::remove_item("lantern", 5),
            ],
            &mut state,
            &catalog(),
        );

        assert_eq!(state.item_count(&lantern), 0);
        assert!(!state.inventory.contains_key(&lantern));
        assert_eq!(
            events.last(),
            Some(&DomainEvent::ItemRemoved {
                item: lantern,
                count: 2,
                total: 0
            })
        );
    }

    #[test]
    fn invalid_target_is_skipped_and_rest_of_batch_applies() {
        let mut state = state();

        let events = ActionExecutor::execute(
            &[
                Action::set_flag("met", true),
                Action::modify_affinity("ghost", 10),
                Action::give_item("lantern", 1),
            ],
            &mut state,
            &catalog(),
        );

        assert_eq!(events.len(), 3);
        assert!(events[1].is_warning());
        assert_eq!(state.flags.get("met"), Some(&FlagValue::Bool(true)));
        assert_eq!(state.item_count(&ItemId::new("lantern")), 1);
        assert!(!state.affinity.contains_key(&CompanionId::new("ghost")));
    }

    #[test]
    fn quest_actions_respect_one_transition_per_turn() {
        let mut state = state();

        let events = ActionExecutor::execute(
            &[
                Action::StartQuest {
                    quest: quest("intro"),
                },
                Action::AdvanceQuestStage {
                    quest: quest("intro"),
                },
            ],
            &mut state,
            &catalog(),
        );

        assert_eq!(events[0], DomainEvent::QuestStarted { quest: quest("intro") });
        assert!(events[1].is_warning());
        assert_eq!(state.quest(&quest("intro")).map(|q| q.stage), Some(1));

        state.turn = 2;
        ActionExecutor::execute(
            &[Action::AdvanceQuestStage {
                quest: quest("intro"),
            }],
            &mut state,
            &catalog(),
        );
        assert_eq!(state.quest(&quest("intro")).map(|q| q.stage), Some(2));

        state.turn = 3;
        ActionExecutor::execute(
            &[Action::AdvanceQuestStage {
                quest: quest("intro"),
            }],
            &mut state,
            &catalog(),
        );
        assert_eq!(state.quest_status(&quest("intro")), QuestStatus::Completed);
    }

    #[test]
    fn reset_is_the_only_way_back() {
        let mut state = state();
        ActionExecutor::execute(
            &[Action::StartQuest {
                quest: quest("intro"),
            }],
            &mut state,
            &catalog(),
        );

        state.turn = 2;
        let events = ActionExecutor::execute(
            &[Action::ResetQuest {
                quest: quest("intro"),
            }],
            &mut state,
            &catalog(),
        );

        assert_eq!(events, vec![DomainEvent::QuestReset { quest: quest("intro") }]);
        let record = state.quest(&quest("intro")).cloned();
        assert_eq!(record.as_ref().map(|q| q.stage), Some(0));
        assert_eq!(record.map(|q| q.status), Some(QuestStatus::NotStarted));
    }

    #[test]
    fn illegal_transition_is_a_warning() {
        let mut state = state();
        let events = ActionExecutor::execute(
            &[Action::CompleteQuest {
                quest: quest("intro"),
            }],
            &mut state,
            &catalog(),
        );
        assert!(events[0].is_warning());
        assert_eq!(state.quest_status(&quest("intro")), QuestStatus::NotStarted);
    }

    #[test]
    fn set_location_unlocks_destination() {
        let mut state = state();
        let events = ActionExecutor::execute(
            &[Action::SetLocation {
                location: LocationId::new("tower"),
            }],
            &mut state,
            &catalog(),
        );
        assert_eq!(state.location.as_str(), "tower");
        assert!(state.unlocked_locations.contains(&LocationId::new("tower")));
        assert!(matches!(events[0], DomainEvent::LocationChanged { .. }));
    }
}

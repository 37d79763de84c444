//! Quest state machine.
//!
//! Once per turn every quest that is NotStarted or Active is checked, in world
//! declaration order, against the live state. Earlier quests' actions are
//! visible to later ones within the same turn. Each quest moves at most one
//! step per turn:
//!
//! - NotStarted -> Active(1) when it is not manual-start, every required quest
//!   is completed and the start condition holds
//! - Active(i) -> Failed when the stage fail condition holds (checked first)
//! - Active(i) -> Active(i+1), or Completed from the last stage, when the stage
//!   completion condition holds

use std::sync::Arc;

use serde::Serialize;
use taleweaver_domain::{
    ActionExecutor, ConditionEvaluator, DomainEvent, GameState, QuestDefinition, QuestId,
    QuestRuntimeState, QuestStatus, Snapshot, World,
};

use crate::infrastructure::ports::QuestContext;

/// One status or stage change made by the quest engine this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestTransition {
    pub quest: QuestId,
    pub title: String,
    /// Hidden quests are left out of what the player sees.
    #[serde(skip)]
    pub hidden: bool,
    pub from: QuestStatus,
    pub to: QuestStatus,
    /// Stage cursor after the transition.
    pub stage: u32,
}

#[derive(Debug, Default)]
pub struct QuestOutcome {
    pub transitions: Vec<QuestTransition>,
    pub events: Vec<DomainEvent>,
}

pub struct QuestEngine {
    world: Arc<World>,
}

impl QuestEngine {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    /// Makes sure every defined quest has a runtime record, in declaration
    /// order. Records for quests the world no longer defines are kept at the
    /// end so nothing in a saved session is lost.
    pub fn initialize(&self, state: &mut GameState) {
        let mut existing = std::mem::take(&mut state.quests);
        let mut ordered = Vec::with_capacity(self.world.quests().len());
        for quest in self.world.quests() {
            match existing.iter().position(|r| r.quest_id == quest.id) {
                Some(index) => ordered.push(existing.remove(index)),
                None => ordered.push(QuestRuntimeState::new(quest.id.clone())),
            }
        }
        ordered.append(&mut existing);
        state.quests = ordered;
    }

    /// Evaluates every open quest once and applies the resulting transitions.
    pub fn run(&self, state: &mut GameState, player_input: &str) -> QuestOutcome {
        self.initialize(state);
        let mut outcome = QuestOutcome::default();

        for quest in self.world.quests() {
            let Some(record) = state.quest(&quest.id) else {
                continue;
            };
            if record.transitioned_on(state.turn) {
                continue;
            }
            let status = record.status;
            match status {
                QuestStatus::NotStarted => self.try_start(quest, state, player_input, &mut outcome),
                QuestStatus::Active => self.try_progress(quest, state, player_input, &mut outcome),
                QuestStatus::Completed | QuestStatus::Failed => {}
            }
        }

        outcome
    }

    fn try_start(
        &self,
        quest: &QuestDefinition,
        state: &mut GameState,
        player_input: &str,
        outcome: &mut QuestOutcome,
    ) {
        if quest.manual_start {
            return;
        }
        let prerequisites_met = quest
            .required_quests
            .iter()
            .all(|required| state.quest_status(required) == QuestStatus::Completed);
        if !prerequisites_met {
            return;
        }
        if !ConditionEvaluator::evaluate(&quest.start_condition, &Snapshot::new(state, player_input))
        {
            return;
        }

        let turn = state.turn;
        if let Some(record) = state.quest_mut(&quest.id) {
            record.start(turn);
        }
        outcome.events.push(DomainEvent::QuestStarted {
            quest: quest.id.clone(),
        });
        self.record(outcome, quest, QuestStatus::NotStarted, QuestStatus::Active, 1);
        tracing::info!(quest = %quest.id, turn, "Quest started");

        if let Some(stage) = quest.stage(1) {
            self.apply(&stage.entry_actions, state, outcome);
        }
    }

    fn try_progress(
        &self,
        quest: &QuestDefinition,
        state: &mut GameState,
        player_input: &str,
        outcome: &mut QuestOutcome,
    ) {
        let turn = state.turn;
        let cursor = state.quest(&quest.id).map(|r| r.stage).unwrap_or(0);
        let Some(stage) = quest.stage(cursor) else {
            tracing::warn!(quest = %quest.id, stage = cursor, "Active quest points at a missing stage");
            return;
        };

        let snapshot = Snapshot::new(state, player_input);
        let failed = stage
            .fail_condition
            .as_ref()
            .is_some_and(|c| ConditionEvaluator::evaluate(c, &snapshot));

        if failed {
            if let Some(record) = state.quest_mut(&quest.id) {
                record.fail(turn);
            }
            outcome.events.push(DomainEvent::QuestFailed {
                quest: quest.id.clone(),
            });
            self.record(outcome, quest, QuestStatus::Active, QuestStatus::Failed, cursor);
            tracing::info!(quest = %quest.id, stage = cursor, turn, "Quest failed");
            self.apply(&stage.fail_actions, state, outcome);
            return;
        }

        if !ConditionEvaluator::evaluate(&stage.completion, &snapshot) {
            return;
        }

        if cursor < quest.stage_count() {
            if let Some(record) = state.quest_mut(&quest.id) {
                record.advance(turn);
            }
            outcome.events.push(DomainEvent::QuestStageAdvanced {
                quest: quest.id.clone(),
                from_stage: cursor,
                to_stage: cursor + 1,
            });
            self.record(outcome, quest, QuestStatus::Active, QuestStatus::Active, cursor + 1);
            tracing::info!(quest = %quest.id, stage = cursor + 1, turn, "Quest advanced");

            self.apply(&stage.completion_actions, state, outcome);
            if let Some(next) = quest.stage(cursor + 1) {
                self.apply(&next.entry_actions, state, outcome);
            }
        } else {
            if let Some(record) = state.quest_mut(&quest.id) {
                record.complete(turn);
            }
            outcome.events.push(DomainEvent::QuestCompleted {
                quest: quest.id.clone(),
            });
            self.record(outcome, quest, QuestStatus::Active, QuestStatus::Completed, cursor);
            tracing::info!(quest = %quest.id, turn, "Quest completed");

            self.apply(&stage.completion_actions, state, outcome);
            self.apply(&quest.rewards, state, outcome);
        }
    }

    fn apply(
        &self,
        actions: &[taleweaver_domain::Action],
        state: &mut GameState,
        outcome: &mut QuestOutcome,
    ) {
        if actions.is_empty() {
            return;
        }
        let events = ActionExecutor::execute(actions, state, self.world.catalog());
        outcome.events.extend(events);
    }

    fn record(
        &self,
        outcome: &mut QuestOutcome,
        quest: &QuestDefinition,
        from: QuestStatus,
        to: QuestStatus,
        stage: u32,
    ) {
        outcome.transitions.push(QuestTransition {
            quest: quest.id.clone(),
            title: quest.title.clone(),
            hidden: quest.hidden,
            from,
            to,
            stage,
        });
    }

    /// Narrator guidance for every visible active quest.
    pub fn active_contexts(&self, state: &GameState) -> Vec<QuestContext> {
        self.world
            .quests()
            .iter()
            .filter(|q| !q.hidden)
            .filter_map(|quest| {
                let record = state.quest(&quest.id)?;
                if record.status != QuestStatus::Active {
                    return None;
                }
                let stage = quest.stage(record.stage)?;
                Some(QuestContext {
                    quest_id: quest.id.clone(),
                    title: quest.title.clone(),
                    stage: record.stage,
                    total_stages: quest.stage_count(),
                    narrative_prompt: stage.narrative_prompt.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{build_world, new_state, world_with};
    use serde_json::json;
    use taleweaver_domain::{Action, CompanionId, FlagValue, ItemId, LocationId};

    fn quest_world(quests: serde_json::Value) -> Arc<World> {
        build_world(world_with("quests", quests))
    }

    fn library_quest() -> serde_json::Value {
        json!([{
            "id": "q",
            "title": "Library",
            "start_condition": { "all": [
                { "field": "turn", "op": "lte", "value": 5 },
                { "field": "location", "op": "eq", "value": "library" }
            ]},
            "stages": [
                {
                    "id": "s1",
                    "narrative_prompt": "Search the shelves.",
                    "entry_actions": [ { "type": "set_flag", "flag": "searching", "value": true } ],
                    "completion": { "field": "flag", "key": "found", "op": "eq", "value": true },
                    "completion_actions": [ { "type": "give_item", "item": "key" } ]
                },
                {
                    "id": "s2",
                    "narrative_prompt": "Open the tower.",
                    "entry_actions": [ { "type": "unlock_location", "location": "tower" } ],
                    "completion": { "field": "location", "op": "eq", "value": "tower" },
                    "fail_condition": { "field": "time_of_day", "op": "eq", "value": "night" },
                    "fail_actions": [ { "type": "modify_affinity", "target": "luna", "delta": -10 } ]
                }
            ],
            "rewards": [ { "type": "modify_affinity", "target": "luna", "delta": 15 } ]
        }])
    }

    fn at_turn(world: &World, turn: u64, location: &str) -> GameState {
        let mut state = new_state(world);
        state.turn = turn;
        state.location = LocationId::new(location);
        state
    }

    #[test]
    fn starts_when_condition_holds_and_applies_entry_actions() {
        let world = quest_world(library_quest());
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 3, "library");

        let outcome = engine.run(&mut state, "");

        let record = state.quest(&QuestId::new("q")).unwrap();
        assert_eq!(record.status, QuestStatus::Active);
        assert_eq!(record.stage, 1);
        assert_eq!(record.stage_entered_turns, vec![3]);
        assert_eq!(state.flags.get("searching"), Some(&FlagValue::Bool(true)));
        assert_eq!(outcome.transitions.len(), 1);
        assert_eq!(outcome.transitions[0].to, QuestStatus::Active);
    }

    #[test]
    fn does_not_start_outside_its_window() {
        let world = quest_world(library_quest());
        let engine = QuestEngine::new(world.clone());

        let mut late = at_turn(&world, 6, "library");
        let mut elsewhere = at_turn(&world, 3, "courtyard");
        engine.run(&mut late, "");
        engine.run(&mut elsewhere, "");

        assert_eq!(late.quest_status(&QuestId::new("q")), QuestStatus::NotStarted);
        assert_eq!(elsewhere.quest_status(&QuestId::new("q")), QuestStatus::NotStarted);
    }

    #[test]
    fn moves_at_most_one_stage_per_turn() {
        let world = quest_world(library_quest());
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 3, "library");
        // Completion of stage 1 already holds when the quest starts.
        state.flags.insert("found".into(), true.into());

        engine.run(&mut state, "");
        assert_eq!(state.quest(&QuestId::new("q")).unwrap().stage, 1);

        state.turn = 4;
        engine.run(&mut state, "");
        let record = state.quest(&QuestId::new("q")).unwrap();
        assert_eq!(record.stage, 2);
        assert_eq!(record.stage_entered_turns, vec![3, 4]);
        assert_eq!(state.item_count(&ItemId::new("key")), 1);
        assert!(state.unlocked_locations.contains(&LocationId::new("tower")));
    }

    #[test]
    fn completing_the_last_stage_grants_rewards() {
        let world = quest_world(library_quest());
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 3, "library");
        state.flags.insert("found".into(), true.into());
        engine.run(&mut state, "");
        state.turn = 4;
        engine.run(&mut state, "");

        state.turn = 5;
        state.location = LocationId::new("tower");
        let outcome = engine.run(&mut state, "");

        assert_eq!(state.quest_status(&QuestId::new("q")), QuestStatus::Completed);
        assert_eq!(state.affinity_of(&CompanionId::new("luna")), 15);
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, DomainEvent::QuestCompleted { .. })));
    }

    #[test]
    fn fail_condition_wins_over_completion() {
        let world = quest_world(library_quest());
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 3, "library");
        state.flags.insert("found".into(), true.into());
        engine.run(&mut state, "");
        state.turn = 4;
        engine.run(&mut state, "");

        state.turn = 5;
        state.location = LocationId::new("tower");
        state.time_of_day = taleweaver_domain::TimeOfDay::Night;
        engine.run(&mut state, "");

        assert_eq!(state.quest_status(&QuestId::new("q")), QuestStatus::Failed);
        assert_eq!(state.affinity_of(&CompanionId::new("luna")), -10);
    }

    #[test]
    fn prerequisites_and_manual_start_gate_quests() {
        let world = quest_world(json!([
            { "id": "first", "title": "First", "manual_start": true,
              "stages": [ { "id": "a", "completion": { "field": "turn", "op": "gte", "value": 1 } } ] },
            { "id": "second", "title": "Second", "required_quests": ["first"],
              "stages": [ { "id": "a", "completion": { "field": "turn", "op": "gte", "value": 100 } } ] }
        ]));
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 1, "courtyard");

        engine.run(&mut state, "");
        assert_eq!(state.quest_status(&QuestId::new("first")), QuestStatus::NotStarted);
        assert_eq!(state.quest_status(&QuestId::new("second")), QuestStatus::NotStarted);

        ActionExecutor::execute(
            &[Action::StartQuest { quest: QuestId::new("first") }],
            &mut state,
            world.catalog(),
        );
        state.turn = 2;
        engine.run(&mut state, "");
        assert_eq!(state.quest_status(&QuestId::new("first")), QuestStatus::Completed);
        // Declared later, so it already sees the completion.
        assert_eq!(state.quest_status(&QuestId::new("second")), QuestStatus::Active);
    }

    #[test]
    fn earlier_quest_actions_are_seen_by_later_quests_in_the_same_turn() {
        let world = quest_world(json!([
            { "id": "a", "title": "A",
              "stages": [ { "id": "s", "entry_actions": [ { "type": "set_flag", "flag": "go", "value": true } ],
                            "completion": { "field": "turn", "op": "gte", "value": 100 } } ] },
            { "id": "b", "title": "B",
              "start_condition": { "field": "flag", "key": "go", "op": "eq", "value": true },
              "stages": [ { "id": "s", "completion": { "field": "turn", "op": "gte", "value": 100 } } ] }
        ]));
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 1, "courtyard");

        let outcome = engine.run(&mut state, "");

        assert_eq!(outcome.transitions.len(), 2);
        assert_eq!(state.quest_status(&QuestId::new("b")), QuestStatus::Active);
    }

    #[test]
    fn quest_changed_by_an_action_this_turn_is_skipped() {
        let world = quest_world(library_quest());
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 3, "library");
        ActionExecutor::execute(
            &[Action::StartQuest { quest: QuestId::new("q") }],
            &mut state,
            world.catalog(),
        );
        state.flags.insert("found".into(), true.into());

        let outcome = engine.run(&mut state, "");

        assert!(outcome.transitions.is_empty());
        assert_eq!(state.quest(&QuestId::new("q")).unwrap().stage, 1);
    }

    #[test]
    fn initialize_restores_declaration_order() {
        let world = quest_world(json!([
            { "id": "a", "title": "A", "stages": [ { "id": "s", "completion": { "all": [] } } ] },
            { "id": "b", "title": "B", "stages": [ { "id": "s", "completion": { "all": [] } } ] }
        ]));
        let engine = QuestEngine::new(world.clone());
        let mut state = new_state(&world);
        state.quests = vec![
            QuestRuntimeState::new(QuestId::new("gone")),
            QuestRuntimeState::new(QuestId::new("b")),
        ];

        engine.initialize(&mut state);

        let ids: Vec<&str> = state.quests.iter().map(|q| q.quest_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "gone"]);
    }

    #[test]
    fn active_contexts_skip_hidden_quests() {
        let world = quest_world(json!([
            { "id": "shown", "title": "Shown",
              "stages": [ { "id": "s", "narrative_prompt": "Visible.", "completion": { "field": "turn", "op": "gte", "value": 100 } } ] },
            { "id": "secret", "title": "Secret", "hidden": true,
              "stages": [ { "id": "s", "narrative_prompt": "Hidden.", "completion": { "field": "turn", "op": "gte", "value": 100 } } ] }
        ]));
        let engine = QuestEngine::new(world.clone());
        let mut state = at_turn(&world, 1, "courtyard");
        engine.run(&mut state, "");

        let contexts = engine.active_contexts(&state);

        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].narrative_prompt, "Visible.");
        assert_eq!(contexts[0].total_stages, 1);
    }
}

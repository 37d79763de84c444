//! Story director: picks the story beat for a turn and tracks arc completion.

use std::sync::Arc;

use taleweaver_domain::{
    Action, ActionExecutor, BeatExecution, ConditionEvaluator, DomainEvent, GameState, Snapshot,
    StoryBeat, World,
};

use crate::infrastructure::ports::{ArcSummary, BeatDirective, NarrativeContext};

/// How many fired beats are echoed back to the narrator.
const RECENT_BEATS: usize = 3;

#[derive(Debug, Default)]
pub struct DirectorOutcome {
    /// Set when a beat fired this turn.
    pub directive: Option<BeatDirective>,
    pub events: Vec<DomainEvent>,
}

pub struct StoryDirector {
    world: Arc<World>,
}

impl StoryDirector {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    /// The beat that should fire now, if any: the eligible beat with the
    /// highest priority, earliest declared on ties. A beat is eligible when
    /// its trigger holds and it is repeatable or has never fired.
    pub fn select_beat(&self, state: &GameState, player_input: &str) -> Option<&StoryBeat> {
        let snapshot = Snapshot::new(state, player_input);
        self.world
            .beats()
            .iter()
            .filter(|beat| beat.repeatable || !state.has_fired(&beat.id))
            .filter(|beat| ConditionEvaluator::evaluate(&beat.trigger, &snapshot))
            .fold(None, |best: Option<&StoryBeat>, beat| match best {
                Some(current) if current.priority >= beat.priority => Some(current),
                _ => Some(beat),
            })
    }

    /// Fires at most one beat, then completes any arc it finished.
    pub fn run(&self, state: &mut GameState, player_input: &str) -> DirectorOutcome {
        let mut outcome = DirectorOutcome::default();
        let Some(beat) = self.select_beat(state, player_input) else {
            return outcome;
        };

        let applied = self.apply_recorded(&beat.consequences, state, &mut outcome.events);
        state.beat_history.push(BeatExecution {
            beat_id: beat.id.clone(),
            turn: state.turn,
            actions_applied: applied,
        });
        outcome.events.push(DomainEvent::BeatFired {
            beat: beat.id.clone(),
            turn: state.turn,
        });
        tracing::info!(beat = %beat.id, priority = beat.priority, turn = state.turn, "Story beat fired");

        self.complete_arcs(beat, state, &mut outcome.events);

        outcome.directive = Some(BeatDirective {
            beat_id: beat.id.clone(),
            description: beat.description.clone(),
            tone: beat.tone.clone(),
            required_elements: beat.required_elements.clone(),
            hard_limits: self.world.hard_limits().to_vec(),
        });
        outcome
    }

    /// Applies `actions` one at a time and returns the ones that took effect.
    fn apply_recorded(
        &self,
        actions: &[Action],
        state: &mut GameState,
        events: &mut Vec<DomainEvent>,
    ) -> Vec<Action> {
        let mut applied = Vec::with_capacity(actions.len());
        for action in actions {
            let before = events.len();
            ActionExecutor::apply(action, state, self.world.catalog(), events);
            if !events[before..].iter().any(DomainEvent::is_warning) {
                applied.push(action.clone());
            }
        }
        applied
    }

    fn complete_arcs(&self, beat: &StoryBeat, state: &mut GameState, events: &mut Vec<DomainEvent>) {
        for arc in self.world.arcs() {
            if !arc.contains(&beat.id) || state.completed_arcs.contains(&arc.id) {
                continue;
            }
            if !arc.required_beats.iter().all(|b| state.has_fired(b)) {
                continue;
            }
            state.completed_arcs.insert(arc.id.clone());
            events.push(DomainEvent::ArcCompleted {
                arc: arc.id.clone(),
            });
            tracing::info!(arc = %arc.id, turn = state.turn, "Narrative arc completed");
            events.extend(ActionExecutor::execute(
                &arc.completion_actions,
                state,
                self.world.catalog(),
            ));
        }
    }

    /// Story framing sent with every prompt, whether or not a beat fired.
    pub fn narrative_context(&self, state: &GameState) -> NarrativeContext {
        let arcs = self
            .world
            .arcs()
            .iter()
            .filter(|arc| !state.completed_arcs.contains(&arc.id))
            .map(|arc| ArcSummary {
                title: arc.title.clone(),
                premise: arc.premise.clone(),
                themes: arc.themes.clone(),
            })
            .collect();

        let skip = state.beat_history.len().saturating_sub(RECENT_BEATS);
        let recent_beats = state.beat_history[skip..]
            .iter()
            .filter_map(|execution| {
                self.world
                    .beats()
                    .iter()
                    .find(|b| b.id == execution.beat_id)
                    .map(|b| b.description.clone())
            })
            .filter(|description| !description.is_empty())
            .collect();

        NarrativeContext {
            arcs,
            hard_limits: self.world.hard_limits().to_vec(),
            recent_beats,
        }
    }

    /// Required elements of `directive` that `narrative` never mentions.
    /// Matching is case-insensitive.
    pub fn missing_elements(directive: &BeatDirective, narrative: &str) -> Vec<String> {
        let lowered = narrative.to_lowercase();
        directive
            .required_elements
            .iter()
            .filter(|element| !lowered.contains(&element.to_lowercase()))
            .cloned()
            .collect()
    }
}

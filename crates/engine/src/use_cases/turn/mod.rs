//! Turn pipeline.
//!
//! A turn runs strictly in order on a working copy of the session state:
//!
//! 1. validate the player input
//! 2. advance the turn counter and, on schedule, the time of day
//! 3. story director picks and fires at most one beat
//! 4. quest engine evaluates every open quest
//! 5. the prompt builder assembles the provider request
//! 6. the LLM manager generates the narrative, or the world fallback is used
//! 7. state updates proposed by the narrator are applied through the executor
//! 8. gameplay heuristics propose further actions, and a generated exchange
//!    joins the conversation history
//! 9. the working copy is persisted; only then does it become the session state
//! 10. a scene render is queued in the background
//!
//! Nothing after step 1 fails the turn except persistence.

mod types;

pub use types::{HealthReport, MediaOutcome, TurnConfig, TurnError, TurnResult};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taleweaver_domain::{
    Action, ActionExecutor, CompanionId, DomainEvent, Exchange, GameState, LocationId,
    MediaJobId, SessionId, TimeOfDay, World,
};

use crate::infrastructure::llm_manager::{LlmManager, ResponseUpdates, StructuredResponse};
use crate::infrastructure::ports::{
    BeatDirective, ClockPort, CompanionInfo, GameplayContext, GameplayPort, LocationInfo,
    MediaPipelinePort, PromptBuilderPort, PromptContext, RenderRequest, SessionRepo,
};
use crate::use_cases::narrative::{DirectorOutcome, StoryDirector};
use crate::use_cases::quest::QuestEngine;
use crate::use_cases::session::GameSession;

pub struct GameEngine {
    world: Arc<World>,
    director: StoryDirector,
    quests: QuestEngine,
    llm: Arc<LlmManager>,
    prompts: Arc<dyn PromptBuilderPort>,
    sessions: Arc<dyn SessionRepo>,
    media: Option<Arc<dyn MediaPipelinePort>>,
    gameplay: Vec<Arc<dyn GameplayPort>>,
    clock: Arc<dyn ClockPort>,
    config: TurnConfig,
}

impl GameEngine {
    pub fn new(
        world: Arc<World>,
        llm: Arc<LlmManager>,
        prompts: Arc<dyn PromptBuilderPort>,
        sessions: Arc<dyn SessionRepo>,
        clock: Arc<dyn ClockPort>,
        config: TurnConfig,
    ) -> Self {
        Self {
            director: StoryDirector::new(world.clone()),
            quests: QuestEngine::new(world.clone()),
            world,
            llm,
            prompts,
            sessions,
            media: None,
            gameplay: Vec::new(),
            clock,
            config,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaPipelinePort>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_gameplay(mut self, heuristic: Arc<dyn GameplayPort>) -> Self {
        self.gameplay.push(heuristic);
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn llm(&self) -> &LlmManager {
        &self.llm
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Checks every provider and, when configured, the media pipeline.
    pub async fn health(&self) -> HealthReport {
        let media = match &self.media {
            Some(pipeline) => Some(match pipeline.check_health().await {
                Ok(healthy) => healthy,
                Err(e) => {
                    tracing::warn!(error = %e, "Media health check failed");
                    false
                }
            }),
            None => None,
        };
        HealthReport {
            providers: self.llm.health().await,
            media,
        }
    }

    /// Creates and persists the initial state of a new playthrough.
    pub async fn new_session(&self) -> Result<GameSession, TurnError> {
        let mut state = self.world.initial_state(SessionId::new(), self.clock.now());
        self.quests.initialize(&mut state);
        self.persist(&state).await?;
        Ok(GameSession::new(state))
    }

    /// Restores a persisted playthrough, reconciling its quest records with
    /// the current world.
    pub async fn load_session(&self, id: SessionId) -> Result<GameSession, TurnError> {
        let loaded = tokio::time::timeout(self.config.persist_timeout, self.sessions.load(id))
            .await
            .map_err(|_| {
                TurnError::Persistence(format!(
                    "load timed out after {:?}",
                    self.config.persist_timeout
                ))
            })?
            .map_err(|e| TurnError::Persistence(e.to_string()))?;

        let Some(mut state) = loaded else {
            return Err(TurnError::SessionNotFound(id));
        };
        if &state.world_id != self.world.id() {
            tracing::warn!(
                session_id = %id,
                session_world = %state.world_id,
                world = %self.world.id(),
                "Session belongs to another world"
            );
            return Err(TurnError::SessionNotFound(id));
        }
        self.quests.initialize(&mut state);
        Ok(GameSession::new(state))
    }

    /// Plays one turn. On error the session keeps its previous state.
    #[tracing::instrument(skip(self, session, input), fields(session_id = %session.id()))]
    pub async fn play_turn(
        &self,
        session: &mut GameSession,
        input: &str,
    ) -> Result<TurnResult, TurnError> {
        let input = self.validate_input(input)?;
        let mut working = session.state().clone();
        let mut events = Vec::new();

        working.turn += 1;
        let turn = working.turn;
        if self.config.time.ticks_at(turn) {
            let from = working.time_of_day;
            working.time_of_day = from.next();
            events.push(DomainEvent::TimeOfDayChanged {
                from,
                to: working.time_of_day,
            });
        }

        let DirectorOutcome {
            directive,
            events: beat_events,
        } = self.director.run(&mut working, input);
        events.extend(beat_events);

        let quest_outcome = self.quests.run(&mut working, input);
        events.extend(quest_outcome.events);

        let context = self.prompt_context(&working, input, directive.clone());
        let request = self.prompts.build(&context);

        let generated = match self.llm.generate(&request, &self.config.schema).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!(turn, error = %e, "No provider produced a narrative, using fallback");
                None
            }
        };

        let narrative = match &generated {
            Some(response) => response.narrative.clone(),
            None => self.world.fallback_narrative().to_string(),
        };
        if let (Some(directive), Some(_)) = (&directive, &generated) {
            let missing = StoryDirector::missing_elements(directive, &narrative);
            if !missing.is_empty() {
                tracing::warn!(beat = %directive.beat_id, ?missing, "Narrative left out required story elements");
            }
        }

        if let Some(response) = &generated {
            let actions = self.response_actions(&response.updates, &working, &mut events);
            events.extend(ActionExecutor::execute(
                &actions,
                &mut working,
                self.world.catalog(),
            ));
        }

        let gameplay_context = GameplayContext {
            turn,
            player_input: input.to_string(),
            narrative: narrative.clone(),
            location: working.location.clone(),
            active_companion: working.active_companion.clone(),
        };
        for heuristic in &self.gameplay {
            let actions = heuristic.propose(&gameplay_context);
            if actions.is_empty() {
                continue;
            }
            tracing::debug!(heuristic = heuristic.name(), count = actions.len(), "Gameplay actions proposed");
            events.extend(ActionExecutor::execute(
                &actions,
                &mut working,
                self.world.catalog(),
            ));
        }

        // The fallback text is not the narrator's voice, so it is not replayed.
        if generated.is_some() {
            working.record_exchange(
                Exchange {
                    turn,
                    player: input.to_string(),
                    narrator: narrative.clone(),
                },
                self.config.history_limit,
            );
        }

        working.updated_at = self.clock.now();
        self.persist(&working).await?;
        let summary = working.summary();
        session.commit(working);

        let media = self.dispatch_media(session, generated.as_ref());
        let provider = generated.map(|response| response.provider);

        tracing::info!(
            turn,
            provider = provider.as_deref().unwrap_or("fallback"),
            events = events.len(),
            "Turn complete"
        );

        Ok(TurnResult {
            session_id: session.id(),
            turn,
            narrative,
            degraded: provider.is_none(),
            provider,
            state: summary,
            events,
            fired_beat: directive.map(|d| d.beat_id),
            quest_transitions: quest_outcome
                .transitions
                .into_iter()
                .filter(|t| !t.hidden)
                .collect(),
            media,
        })
    }

    fn validate_input<'a>(&self, input: &'a str) -> Result<&'a str, TurnError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TurnError::InvalidInput("input is empty".to_string()));
        }
        let chars = trimmed.chars().count();
        if chars > self.config.max_input_chars {
            return Err(TurnError::InvalidInput(format!(
                "input is {chars} characters, the limit is {}",
                self.config.max_input_chars
            )));
        }
        Ok(trimmed)
    }

    fn prompt_context(
        &self,
        state: &GameState,
        input: &str,
        directive: Option<BeatDirective>,
    ) -> PromptContext {
        let location = match self.world.location(&state.location) {
            Some(def) => LocationInfo {
                id: def.id.clone(),
                name: def.name.clone(),
                description: def.description.clone(),
            },
            None => LocationInfo {
                id: state.location.clone(),
                name: state.location.to_string(),
                description: String::new(),
            },
        };
        let companion = state
            .active_companion
            .as_ref()
            .and_then(|id| self.world.companion(id))
            .map(|def| CompanionInfo {
                id: def.id.clone(),
                name: def.name.clone(),
                description: def.description.clone(),
                affinity: state.affinity_of(&def.id),
            });

        PromptContext {
            world_title: self.world.title().to_string(),
            world_description: self.world.description().to_string(),
            player_input: input.to_string(),
            state: state.summary(),
            location,
            companion,
            quests: self.quests.active_contexts(state),
            narrative: self.director.narrative_context(state),
            directive,
            history: state.recent_exchanges.clone(),
        }
    }

    /// Turns narrator-proposed updates into actions. Affinity changes are
    /// capped per companion; moves to unreachable places and unknown times of
    /// day are refused with a warning.
    fn response_actions(
        &self,
        updates: &ResponseUpdates,
        state: &GameState,
        events: &mut Vec<DomainEvent>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let cap = self.config.max_affinity_delta.abs();

        for (companion, delta) in &updates.affinity {
            let capped = (*delta).clamp(-cap, cap);
            if capped != *delta {
                tracing::debug!(companion = %companion, proposed = delta, applied = capped, "Capped narrator affinity change");
            }
            if capped != 0 {
                actions.push(Action::modify_affinity(CompanionId::new(companion.as_str()), capped));
            }
        }
        for (flag, value) in &updates.set_flags {
            actions.push(Action::set_flag(flag.clone(), *value));
        }
        for item in &updates.items_gained {
            actions.push(Action::give_item(item.as_str(), 1));
        }
        for item in &updates.items_lost {
            actions.push(Action::remove_item(item.as_str(), 1));
        }

        if let Some(location) = updates.location.as_deref().map(LocationId::new) {
            if location != state.location {
                if state.unlocked_locations.contains(&location) {
                    actions.push(Action::SetLocation { location });
                } else {
                    events.push(DomainEvent::warning(
                        "set_location",
                        format!("location '{location}' is not reachable"),
                    ));
                }
            }
        }

        if let Some(raw) = updates.time_of_day.as_deref() {
            match TimeOfDay::from_key(raw) {
                Some(time) if time != state.time_of_day => {
                    actions.push(Action::SetTimeOfDay { time });
                }
                Some(_) => {}
                None => events.push(DomainEvent::warning(
                    "set_time_of_day",
                    format!("unknown time of day '{raw}'"),
                )),
            }
        }

        actions
    }

    async fn persist(&self, state: &GameState) -> Result<(), TurnError> {
        let timeout = self.config.persist_timeout;
        match tokio::time::timeout(timeout, self.sessions.save(state.session_id, state)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(session_id = %state.session_id, error = %e, "Failed to persist session");
                Err(TurnError::Persistence(e.to_string()))
            }
            Err(_) => {
                tracing::error!(session_id = %state.session_id, ?timeout, "Session save timed out");
                Err(TurnError::Persistence(format!(
                    "save timed out after {timeout:?}"
                )))
            }
        }
    }

    fn dispatch_media(
        &self,
        session: &mut GameSession,
        response: Option<&StructuredResponse>,
    ) -> MediaOutcome {
        let Some(pipeline) = &self.media else {
            return MediaOutcome::Skipped;
        };
        let Some((prompt, tags)) =
            response.and_then(|r| r.visual_prompt.clone().map(|p| (p, r.tags.clone())))
        else {
            return MediaOutcome::Skipped;
        };

        let job_id = MediaJobId::new();
        let request = RenderRequest {
            job_id,
            prompt,
            tags,
            width: self.config.image_width,
            height: self.config.image_height,
        };
        match pipeline.enqueue(request) {
            Ok(handle) => {
                session.track_media(handle);
                MediaOutcome::Pending { job_id }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Media unavailable for this turn");
                MediaOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}

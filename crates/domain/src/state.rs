//! GameState aggregate - everything a session remembers between turns.
//!
//! The state is plain data. Within a turn it is mutated only through
//! [`crate::rules::ActionExecutor`] and the engine's turn/time advance, and it is
//! owned by exactly one in-flight turn at a time.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game_time::TimeOfDay;
use crate::ids::{ArcId, BeatId, CompanionId, ItemId, LocationId, QuestId, SessionId, WorldKey};
use crate::rules::action::Action;

/// Lowest affinity a companion can reach.
pub const AFFINITY_MIN: i32 = -100;
/// Highest affinity a companion can reach.
pub const AFFINITY_MAX: i32 = 100;

/// Value stored under a flag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl std::fmt::Display for FlagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(n) => write!(f, "{}", n),
        }
    }
}

// =============================================================================
// Quest runtime
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    NotStarted,
    Active,
    Completed,
    Failed,
}

impl QuestStatus {
    pub fn as_key(&self) -> &'static str {
        match self {
            QuestStatus::NotStarted => "not_started",
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
        }
    }

    pub fn from_key(key: &str) -> Option<QuestStatus> {
        [
            QuestStatus::NotStarted,
            QuestStatus::Active,
            QuestStatus::Completed,
            QuestStatus::Failed,
        ]
        .into_iter()
        .find(|s| s.as_key().eq_ignore_ascii_case(key.trim()))
    }

    /// Completed and Failed quests are never evaluated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Completed | QuestStatus::Failed)
    }
}

impl std::fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Per-session progress through one quest definition.
///
/// # Invariants
///
/// - `stage` is 0 while NotStarted and 1..=N once the quest has started
/// - `stage` never decreases except through [`QuestRuntimeState::reset`]
/// - at most one transition is recorded per turn (`last_transition_turn`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRuntimeState {
    pub quest_id: QuestId,
    pub status: QuestStatus,
    /// 1-based stage cursor; 0 before the quest starts.
    pub stage: u32,
    /// Turn on which each stage was entered, indexed by `stage - 1`.
    #[serde(default)]
    pub stage_entered_turns: Vec<u64>,
    #[serde(default)]
    pub last_transition_turn: Option<u64>,
}

impl QuestRuntimeState {
    pub fn new(quest_id: QuestId) -> Self {
        Self {
            quest_id,
            status: QuestStatus::NotStarted,
            stage: 0,
            stage_entered_turns: Vec::new(),
            last_transition_turn: None,
        }
    }

    pub fn transitioned_on(&self, turn: u64) -> bool {
        self.last_transition_turn == Some(turn)
    }

    pub fn start(&mut self, turn: u64) {
        self.status = QuestStatus::Active;
        self.stage = 1;
        self.stage_entered_turns = vec![turn];
        self.last_transition_turn = Some(turn);
    }

    pub fn advance(&mut self, turn: u64) {
        self.stage += 1;
        self.stage_entered_turns.push(turn);
        self.last_transition_turn = Some(turn);
    }

    pub fn complete(&mut self, turn: u64) {
        self.status = QuestStatus::Completed;
        self.last_transition_turn = Some(turn);
    }

    pub fn fail(&mut self, turn: u64) {
        self.status = QuestStatus::Failed;
        self.last_transition_turn = Some(turn);
    }

    /// The only path that moves the stage cursor backwards.
    pub fn reset(&mut self, turn: u64) {
        self.status = QuestStatus::NotStarted;
        self.stage = 0;
        self.stage_entered_turns.clear();
        self.last_transition_turn = Some(turn);
    }
}

// =============================================================================
// Beat history
// =============================================================================

/// Append-only record of a story beat firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatExecution {
    pub beat_id: BeatId,
    pub turn: u64,
    pub actions_applied: Vec<Action>,
}

// =============================================================================
// Conversation
// =============================================================================

/// One player input and the narration generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub turn: u64,
    pub player: String,
    pub narrator: String,
}

// =============================================================================
// Game State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub session_id: SessionId,
    pub world_id: WorldKey,
    /// Number of completed turns.
    pub turn: u64,
    pub time_of_day: TimeOfDay,
    pub location: LocationId,
    #[serde(default)]
    pub active_companion: Option<CompanionId>,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub affinity: BTreeMap<CompanionId, i32>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    #[serde(default)]
    pub inventory: BTreeMap<ItemId, u32>,
    #[serde(default)]
    pub unlocked_locations: BTreeSet<LocationId>,
    #[serde(default)]
    pub global_events: Vec<String>,
    /// Quest records in world declaration order.
    #[serde(default)]
    pub quests: Vec<QuestRuntimeState>,
    #[serde(default)]
    pub beat_history: Vec<BeatExecution>,
    #[serde(default)]
    pub completed_arcs: BTreeSet<ArcId>,
    /// Most recent exchanges, oldest first. Bounded by [`GameState::record_exchange`].
    #[serde(default)]
    pub recent_exchanges: Vec<Exchange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameState {
    pub fn new(
        session_id: SessionId,
        world_id: WorldKey,
        location: LocationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            world_id,
            turn: 0,
            time_of_day: TimeOfDay::default(),
            location,
            active_companion: None,
            stats: BTreeMap::new(),
            affinity: BTreeMap::new(),
            flags: BTreeMap::new(),
            inventory: BTreeMap::new(),
            unlocked_locations: BTreeSet::new(),
            global_events: Vec::new(),
            quests: Vec::new(),
            beat_history: Vec::new(),
            completed_arcs: BTreeSet::new(),
            recent_exchanges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn quest(&self, id: &QuestId) -> Option<&QuestRuntimeState> {
        self.quests.iter().find(|q| &q.quest_id == id)
    }

    pub fn quest_mut(&mut self, id: &QuestId) -> Option<&mut QuestRuntimeState> {
        self.quests.iter_mut().find(|q| &q.quest_id == id)
    }

    pub fn quest_status(&self, id: &QuestId) -> QuestStatus {
        self.quest(id).map(|q| q.status).unwrap_or_default()
    }

    pub fn item_count(&self, item: &ItemId) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    pub fn affinity_of(&self, companion: &CompanionId) -> i32 {
        self.affinity.get(companion).copied().unwrap_or(0)
    }

    pub fn has_fired(&self, beat: &BeatId) -> bool {
        self.beat_history.iter().any(|b| &b.beat_id == beat)
    }

    pub fn beats_fired(&self, beat: &BeatId) -> usize {
        self.beat_history.iter().filter(|b| &b.beat_id == beat).count()
    }

    /// Appends an exchange and drops the oldest ones beyond `limit`.
    pub fn record_exchange(&mut self, exchange: Exchange, limit: usize) {
        self.recent_exchanges.push(exchange);
        let excess = self.recent_exchanges.len().saturating_sub(limit);
        self.recent_exchanges.drain(..excess);
    }

    /// Compact view for API responses and logs.
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            turn: self.turn,
            time_of_day: self.time_of_day,
            location: self.location.clone(),
            active_companion: self.active_companion.clone(),
            affinity: self.affinity.clone(),
            stats: self.stats.clone(),
            inventory: self.inventory.clone(),
            active_quests: self
                .quests
                .iter()
                .filter(|q| q.status == QuestStatus::Active)
                .map(|q| q.quest_id.clone())
                .collect(),
            completed_quests: self
                .quests
                .iter()
                .filter(|q| q.status == QuestStatus::Completed)
                .map(|q| q.quest_id.clone())
                .collect(),
        }
    }
}

/// Read-only projection of [`GameState`] returned with every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub turn: u64,
    pub time_of_day: TimeOfDay,
    pub location: LocationId,
    pub active_companion: Option<CompanionId>,
    pub affinity: BTreeMap<CompanionId, i32>,
    pub stats: BTreeMap<String, i64>,
    pub inventory: BTreeMap<ItemId, u32>,
    pub active_quests: Vec<QuestId>,
    pub completed_quests: Vec<QuestId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
    }

    #[test]
    fn quest_runtime_lifecycle_tracks_stage_entry_turns() {
        let mut quest = QuestRuntimeState::new(QuestId::new("q"));
        assert_eq!(quest.stage, 0);

        quest.start(3);
        quest.advance(5);
        assert_eq!(quest.status, QuestStatus::Active);
        assert_eq!(quest.stage, 2);
        assert_eq!(quest.stage_entered_turns, vec![3, 5]);
        assert!(quest.transitioned_on(5));

        quest.reset(6);
        assert_eq!(quest.status, QuestStatus::NotStarted);
        assert_eq!(quest.stage, 0);
    }

    #[test]
    fn missing_lookups_default_to_zero() {
        let state = GameState::new(
            SessionId::new(),
            WorldKey::new("w"),
            LocationId::new("hall"),
            fixed_now(),
        );
        assert_eq!(state.item_count(&ItemId::new("sword")), 0);
        assert_eq!(state.affinity_of(&CompanionId::new("luna")), 0);
        assert_eq!(state.quest_status(&QuestId::new("nope")), QuestStatus::NotStarted);
    }

    #[test]
    fn exchange_history_keeps_the_most_recent() {
        let mut state = GameState::new(
            SessionId::new(),
            WorldKey::new("w"),
            LocationId::new("hall"),
            fixed_now(),
        );
        for turn in 1..=5 {
            let exchange = Exchange {
                turn,
                player: format!("input {turn}"),
                narrator: format!("reply {turn}"),
            };
            state.record_exchange(exchange, 3);
        }

        let turns: Vec<u64> = state.recent_exchanges.iter().map(|e| e.turn).collect();
        assert_eq!(turns, vec![3, 4, 5]);

        state.record_exchange(
            Exchange {
                turn: 6,
                player: "x".into(),
                narrator: "y".into(),
            },
            0,
        );
        assert!(state.recent_exchanges.is_empty());
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = GameState::new(
            SessionId::new(),
            WorldKey::new("w"),
            LocationId::new("hall"),
            fixed_now(),
        );
        state.flags.insert("met".into(), FlagValue::Bool(true));
        state.flags.insert("visits".into(), FlagValue::Int(3));

        let json = serde_json::to_string(&state).unwrap();
        let restored: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}

//! Taleweaver domain: game state, world definitions, and the rule engine.
//!
//! Everything here is synchronous and free of I/O. The engine crate owns the
//! turn pipeline and talks to the outside world through its ports.

pub mod error;
pub mod events;
pub mod game_time;
pub mod ids;
pub mod quest;
pub mod rules;
pub mod state;
pub mod story;
pub mod world;

pub use error::{ValidationError, WorldValidationErrors};
pub use events::DomainEvent;
pub use game_time::{TimeOfDay, TimeProgression};
pub use ids::{
    ArcId, BeatId, CompanionId, ItemId, LocationId, MediaJobId, QuestId, SessionId, StageId,
    WorldKey,
};
pub use quest::{QuestDefinition, QuestStage};
pub use rules::{
    Action, ActionExecutor, CompareOp, Comparison, Condition, ConditionEvaluator, Field, Snapshot,
    Value,
};
pub use state::{
    BeatExecution, Exchange, FlagValue, GameState, QuestRuntimeState, QuestStatus, StateSummary,
    AFFINITY_MAX, AFFINITY_MIN,
};
pub use story::{NarrativeArc, StoryBeat};
pub use world::{
    CompanionDef, ItemDef, LocationDef, StartingState, World, WorldCatalog, WorldContent,
    DEFAULT_FALLBACK_NARRATIVE,
};

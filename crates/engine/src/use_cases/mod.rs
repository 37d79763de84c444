//! Use cases - the rule engines and the turn pipeline that orchestrates them.
//!
//! - `narrative` - story beat selection and arc completion
//! - `quest` - quest lifecycle
//! - `turn` - the per-turn pipeline (`GameEngine`)
//! - `session` - live sessions, one turn in flight each

pub mod narrative;
pub mod quest;
pub mod session;
pub mod turn;

pub use narrative::{DirectorOutcome, StoryDirector};
pub use quest::{QuestEngine, QuestOutcome, QuestTransition};
pub use session::{GameSession, SessionRegistry, SessionView};
pub use turn::{GameEngine, HealthReport, MediaOutcome, TurnConfig, TurnError, TurnResult};

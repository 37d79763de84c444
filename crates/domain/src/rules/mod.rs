//! The condition/action rule engine shared by quests and story beats.

pub mod action;
pub mod condition;
pub mod evaluator;
pub mod executor;

pub use action::Action;
pub use condition::{CompareOp, Comparison, Condition, Field, Value, ValueKind};
pub use evaluator::{ConditionEvaluator, Snapshot};
pub use executor::ActionExecutor;

//! Pure evaluation of [`Condition`] trees against a game state snapshot.

use std::cmp::Ordering;

use crate::ids::{CompanionId, ItemId, QuestId};
use crate::state::{FlagValue, GameState};

use super::condition::{CompareOp, Comparison, Condition, Field, Value};

/// Read-only view a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub state: &'a GameState,
    /// Text the player typed this turn; empty outside a turn.
    pub player_input: &'a str,
}

impl<'a> Snapshot<'a> {
    pub fn new(state: &'a GameState, player_input: &'a str) -> Self {
        Self {
            state,
            player_input,
        }
    }

    pub fn of(state: &'a GameState) -> Self {
        Self::new(state, "")
    }
}

/// Evaluates conditions. Deterministic and infallible: references to things
/// the state has never recorded read as the zero value of the literal's type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn evaluate(condition: &Condition, snapshot: &Snapshot<'_>) -> bool {
        match condition {
            Condition::All { all } => all.iter().all(|c| Self::evaluate(c, snapshot)),
            Condition::Any { any } => {
                any.is_empty() || any.iter().any(|c| Self::evaluate(c, snapshot))
            }
            Condition::Not { not } => !Self::evaluate(not, snapshot),
            Condition::Compare(cmp) => {
                let actual = resolve(cmp, snapshot).unwrap_or_else(|| cmp.value.kind().zero());
                compare(&actual, cmp.op, &cmp.value)
            }
        }
    }
}

fn resolve(cmp: &Comparison, snapshot: &Snapshot<'_>) -> Option<Value> {
    let state = snapshot.state;
    let key = cmp.key.as_deref().unwrap_or_default();

    match cmp.field {
        Field::Flag => state.flags.get(key).map(|flag| match flag {
            FlagValue::Bool(b) => Value::Bool(*b),
            FlagValue::Int(n) => Value::Int(*n),
        }),
        Field::Affinity => state
            .affinity
            .get(&CompanionId::new(key))
            .map(|a| Value::Int(i64::from(*a))),
        Field::Item => state
            .inventory
            .get(&ItemId::new(key))
            .map(|n| Value::Int(i64::from(*n))),
        Field::Stat => state.stats.get(key).map(|v| Value::Int(*v)),
        Field::QuestStatus => Some(Value::Text(
            state.quest_status(&QuestId::new(key)).as_key().to_string(),
        )),
        Field::Location => Some(Value::Text(state.location.as_str().to_string())),
        Field::Turn => Some(Value::Int(i64::try_from(state.turn).unwrap_or(i64::MAX))),
        Field::TimeOfDay => Some(Value::Text(state.time_of_day.as_key().to_string())),
        Field::ActiveCompanion => state
            .active_companion
            .as_ref()
            .map(|c| Value::Text(c.as_str().to_string())),
        Field::PlayerInput => Some(Value::Text(snapshot.player_input.to_string())),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Int(a), Value::Int(b)) => ordered(a.cmp(b), op),
        (Value::Bool(a), Value::Bool(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Neq => a != b,
            _ => false,
        },
        (Value::Text(a), Value::Text(b)) => {
            let a = a.to_lowercase();
            let b = b.to_lowercase();
            match op {
                CompareOp::Eq => a == b,
                CompareOp::Neq => a != b,
                CompareOp::Contains => a.contains(&b),
                _ => false,
            }
        }
        // Values of different types are never equal.
        _ => op == CompareOp::Neq,
    }
}

fn ordered(ordering: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Neq => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Gte => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Lte => ordering != Ordering::Greater,
        CompareOp::Contains => false,
    }
}

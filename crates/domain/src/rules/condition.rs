//! Condition trees used by quest stages and story beat triggers.
//!
//! World files write conditions as JSON:
//!
//! ```json
//! { "all": [
//!     { "field": "turn", "op": "lte", "value": 5 },
//!     { "field": "location", "op": "eq", "value": "library" },
//!     { "not": { "field": "flag", "key": "met_luna", "op": "eq", "value": true } }
//! ] }
//! ```
//!
//! Structure and typing are checked once by [`Condition::validate`] when the
//! world loads, so evaluation never has to report an error.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::game_time::TimeOfDay;
use crate::state::QuestStatus;
use crate::world::WorldCatalog;

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Text,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "boolean",
            ValueKind::Int => "integer",
            ValueKind::Text => "text",
        }
    }

    /// What a missing reference reads as.
    pub fn zero(&self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Text => Value::Text(String::new()),
        }
    }

    fn supports(&self, op: CompareOp) -> bool {
        match self {
            ValueKind::Bool => matches!(op, CompareOp::Eq | CompareOp::Neq),
            ValueKind::Int => !matches!(op, CompareOp::Contains),
            ValueKind::Text => matches!(op, CompareOp::Eq | CompareOp::Neq | CompareOp::Contains),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Neq => "neq",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
            CompareOp::Contains => "contains",
        }
    }
}

/// Which part of the game state a comparison reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// `key` names the flag.
    Flag,
    /// `key` names the companion.
    Affinity,
    /// `key` names the item; reads the held count.
    Item,
    /// `key` names the stat.
    Stat,
    /// `key` names the quest; reads its status.
    QuestStatus,
    Location,
    Turn,
    TimeOfDay,
    ActiveCompanion,
    /// The raw text the player typed this turn.
    PlayerInput,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Flag => "flag",
            Field::Affinity => "affinity",
            Field::Item => "item",
            Field::Stat => "stat",
            Field::QuestStatus => "quest_status",
            Field::Location => "location",
            Field::Turn => "turn",
            Field::TimeOfDay => "time_of_day",
            Field::ActiveCompanion => "active_companion",
            Field::PlayerInput => "player_input",
        }
    }

    pub fn requires_key(&self) -> bool {
        matches!(
            self,
            Field::Flag | Field::Affinity | Field::Item | Field::Stat | Field::QuestStatus
        )
    }

    /// Literal kinds the field can be compared against. Flags hold either
    /// booleans or integers.
    fn accepts(&self, kind: ValueKind) -> bool {
        match self {
            Field::Flag => matches!(kind, ValueKind::Bool | ValueKind::Int),
            Field::Affinity | Field::Item | Field::Stat | Field::Turn => kind == ValueKind::Int,
            Field::QuestStatus
            | Field::Location
            | Field::TimeOfDay
            | Field::ActiveCompanion
            | Field::PlayerInput => kind == ValueKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: Field,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub op: CompareOp,
    pub value: Value,
}

impl Comparison {
    pub fn new(field: Field, op: CompareOp, value: Value) -> Self {
        Self {
            field,
            key: None,
            op,
            value,
        }
    }

    pub fn keyed(field: Field, key: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            field,
            key: Some(key.into()),
            op,
            value,
        }
    }
}

/// Boolean expression over game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    Not { not: Box<Condition> },
    Compare(Comparison),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::always()
    }
}

impl Condition {
    /// An empty conjunction, which always holds.
    pub fn always() -> Self {
        Condition::All { all: Vec::new() }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { all: conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any { any: conditions }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            not: Box::new(condition),
        }
    }

    pub fn compare(field: Field, op: CompareOp, value: Value) -> Self {
        Condition::Compare(Comparison::new(field, op, value))
    }

    pub fn compare_key(field: Field, key: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Condition::Compare(Comparison::keyed(field, key, op, value))
    }

    /// Checks typing and references against the world catalog. Problems are
    /// appended to `errors` so the whole world can be reported at once.
    pub fn validate(&self, path: &str, catalog: &WorldCatalog, errors: &mut Vec<ValidationError>) {
        match self {
            Condition::All { all } => {
                for (i, c) in all.iter().enumerate() {
                    c.validate(&format!("{path}.all[{i}]"), catalog, errors);
                }
            }
            Condition::Any { any } => {
                for (i, c) in any.iter().enumerate() {
                    c.validate(&format!("{path}.any[{i}]"), catalog, errors);
                }
            }
            Condition::Not { not } => not.validate(&format!("{path}.not"), catalog, errors),
            Condition::Compare(cmp) => validate_comparison(cmp, path, catalog, errors),
        }
    }
}

fn validate_comparison(
    cmp: &Comparison,
    path: &str,
    catalog: &WorldCatalog,
    errors: &mut Vec<ValidationError>,
) {
    let kind = cmp.value.kind();

    if !cmp.field.accepts(kind) {
        errors.push(ValidationError::TypeMismatch {
            path: path.to_string(),
            field: cmp.field.as_str().to_string(),
            literal: kind.name(),
        });
        return;
    }
    if !kind.supports(cmp.op) {
        errors.push(ValidationError::UnsupportedOperator {
            path: path.to_string(),
            op: cmp.op.as_str().to_string(),
            literal: kind.name(),
        });
    }

    let key = cmp.key.as_deref().map(str::trim).filter(|k| !k.is_empty());
    if cmp.field.requires_key() && key.is_none() {
        errors.push(ValidationError::invalid(
            path,
            format!("field '{}' needs a 'key'", cmp.field.as_str()),
        ));
        return;
    }

    match (cmp.field, key) {
        (Field::Affinity, Some(k)) if !catalog.has_companion(k) => {
            errors.push(ValidationError::unknown(path, "companion", k));
        }
        (Field::Item, Some(k)) if !catalog.has_item(k) => {
            errors.push(ValidationError::unknown(path, "item", k));
        }
        (Field::QuestStatus, Some(k)) if !catalog.has_quest(k) => {
            errors.push(ValidationError::unknown(path, "quest", k));
        }
        _ => {}
    }

    // Equality against a closed set of text values must name a real member.
    let Value::Text(text) = &cmp.value else {
        return;
    };
    if cmp.op == CompareOp::Contains {
        return;
    }
    match cmp.field {
        Field::QuestStatus if QuestStatus::from_key(text).is_none() => {
            errors.push(ValidationError::invalid(
                path,
                format!("'{text}' is not a quest status"),
            ));
        }
        Field::TimeOfDay if TimeOfDay::from_key(text).is_none() => {
            errors.push(ValidationError::invalid(
                path,
                format!("'{text}' is not a time of day"),
            ));
        }
        Field::Location if !catalog.has_location(text) => {
            errors.push(ValidationError::unknown(path, "location", text));
        }
        Field::ActiveCompanion if !text.is_empty() && !catalog.has_companion(text) => {
            errors.push(ValidationError::unknown(path, "companion", text));
        }
        _ => {}
    }
}

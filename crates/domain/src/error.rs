//! Error types for the domain layer
//!
//! World content is checked once, at load. Everything that can be wrong with a
//! world file surfaces here as a [`ValidationError`]; rule evaluation itself is
//! infallible.

use thiserror::Error;

/// A single structural problem found while validating world content.
///
/// `path` locates the offending node, e.g. `quests[intro].stages[1].completion`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{path}: duplicate id '{id}'")]
    DuplicateId { path: String, id: String },

    #[error("{path}: unknown {kind} '{id}'")]
    UnknownReference {
        path: String,
        kind: &'static str,
        id: String,
    },

    #[error("{path}: field '{field}' cannot be compared with a {literal} literal")]
    TypeMismatch {
        path: String,
        field: String,
        literal: &'static str,
    },

    #[error("{path}: operator '{op}' is not supported for {literal} values")]
    UnsupportedOperator {
        path: String,
        op: String,
        literal: &'static str,
    },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
}

impl ValidationError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unknown(path: impl Into<String>, kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownReference {
            path: path.into(),
            kind,
            id: id.into(),
        }
    }
}

/// Every problem in a world file, collected in one pass so authors can fix
/// them together.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("world '{world}' failed validation with {} error(s): {}", .errors.len(), render(.errors))]
pub struct WorldValidationErrors {
    pub world: String,
    pub errors: Vec<ValidationError>,
}

fn render(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

//! Taleweaver Engine library.
//!
//! This crate contains the turn pipeline and everything around it.
//!
//! ## Structure
//!
//! - `use_cases/` - Quest and story engines, the turn pipeline, live sessions
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// Shared builders for unit tests.
#[cfg(test)]
pub mod test_fixtures;

pub use app::App;

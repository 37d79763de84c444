//! Shared builders for engine tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use taleweaver_domain::{GameState, SessionId, World, WorldContent};

/// The world shipped in `worlds/`.
pub const MOONLIT: &str = include_str!("../../../../worlds/moonlit.json");

pub fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_default()
}

/// A small world with two open locations, a locked one, one companion and
/// one item. Tests add quests, beats and arcs on top.
pub fn base_world() -> Value {
    json!({
        "id": "testworld",
        "title": "Test World",
        "description": "A world for tests.",
        "start": { "location": "courtyard", "active_companion": "luna" },
        "locations": [
            { "id": "courtyard", "name": "Courtyard" },
            { "id": "library", "name": "Library" },
            { "id": "tower", "name": "Tower", "locked": true }
        ],
        "companions": [ { "id": "luna", "name": "Luna" } ],
        "items": [ { "id": "key", "name": "Key" } ],
        "hard_limits": ["No gore."],
        "fallback_narrative": "Nothing stirs."
    })
}

/// `base_world()` with `field` replaced.
pub fn world_with(field: &str, value: Value) -> Value {
    let mut world = base_world();
    world[field] = value;
    world
}

/// Panics on invalid content; tests want to fail loudly.
pub fn build_world(content: Value) -> Arc<World> {
    let content: WorldContent = serde_json::from_value(content).expect("world json");
    Arc::new(content.validate().expect("valid world"))
}

pub fn moonlit() -> Arc<World> {
    let content: WorldContent = serde_json::from_str(MOONLIT).expect("moonlit json");
    Arc::new(content.validate().expect("valid moonlit"))
}

/// Fresh state at turn 0.
pub fn new_state(world: &World) -> GameState {
    world.initial_state(SessionId::new(), fixed_now())
}

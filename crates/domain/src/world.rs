//! World content: the static definitions a session plays against.
//!
//! [`WorldContent`] is the raw, deserialized file. It becomes a [`World`] only
//! through [`WorldContent::validate`], so every `World` in the engine is known to
//! reference only things it defines and to contain well-typed conditions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, WorldValidationErrors};
use crate::game_time::TimeOfDay;
use crate::ids::{CompanionId, ItemId, LocationId, QuestId, SessionId, WorldKey};
use crate::quest::QuestDefinition;
use crate::rules::action::validate_all;
use crate::state::{FlagValue, GameState, QuestRuntimeState, AFFINITY_MAX, AFFINITY_MIN};
use crate::story::{NarrativeArc, StoryBeat};

/// Narration used when no provider can produce a turn.
pub const DEFAULT_FALLBACK_NARRATIVE: &str =
    "The moment stretches on in silence. Whatever comes next will have to wait a little longer.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDef {
    pub id: LocationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Locked locations must be unlocked by an action before they count as
    /// reachable.
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionDef {
    pub id: CompanionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub starting_affinity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Where a new session begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingState {
    pub location: LocationId,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub active_companion: Option<CompanionId>,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    #[serde(default)]
    pub inventory: BTreeMap<ItemId, u32>,
    /// Shown as the narrative of turn zero.
    #[serde(default)]
    pub intro: Option<String>,
}

/// World file as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldContent {
    pub id: WorldKey,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start: StartingState,
    #[serde(default)]
    pub locations: Vec<LocationDef>,
    #[serde(default)]
    pub companions: Vec<CompanionDef>,
    #[serde(default)]
    pub items: Vec<ItemDef>,
    #[serde(default)]
    pub quests: Vec<QuestDefinition>,
    #[serde(default)]
    pub beats: Vec<StoryBeat>,
    #[serde(default)]
    pub arcs: Vec<NarrativeArc>,
    /// Content rules the narrator must never break, sent with every prompt.
    #[serde(default)]
    pub hard_limits: Vec<String>,
    #[serde(default)]
    pub fallback_narrative: Option<String>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Lookup of every id a world defines. Used to validate references at load
/// and by the executor to skip actions aimed at things that do not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldCatalog {
    locations: BTreeSet<String>,
    companions: BTreeSet<String>,
    items: BTreeSet<String>,
    quest_stages: BTreeMap<String, u32>,
}

impl WorldCatalog {
    pub fn builder() -> WorldCatalogBuilder {
        WorldCatalogBuilder::default()
    }

    fn from_content(content: &WorldContent) -> Self {
        Self {
            locations: content
                .locations
                .iter()
                .map(|l| l.id.as_str().to_string())
                .collect(),
            companions: content
                .companions
                .iter()
                .map(|c| c.id.as_str().to_string())
                .collect(),
            items: content
                .items
                .iter()
                .map(|i| i.id.as_str().to_string())
                .collect(),
            quest_stages: content
                .quests
                .iter()
                .map(|q| (q.id.as_str().to_string(), q.stage_count()))
                .collect(),
        }
    }

    pub fn has_location(&self, id: &str) -> bool {
        self.locations.contains(id)
    }

    pub fn has_companion(&self, id: &str) -> bool {
        self.companions.contains(id)
    }

    pub fn has_item(&self, id: &str) -> bool {
        self.items.contains(id)
    }

    pub fn has_quest(&self, id: &str) -> bool {
        self.quest_stages.contains_key(id)
    }

    pub fn quest_stage_count(&self, id: &QuestId) -> Option<u32> {
        self.quest_stages.get(id.as_str()).copied()
    }
}

#[derive(Debug, Default)]
pub struct WorldCatalogBuilder {
    catalog: WorldCatalog,
}

impl WorldCatalogBuilder {
    pub fn location(mut self, id: &str) -> Self {
        self.catalog.locations.insert(id.to_string());
        self
    }

    pub fn companion(mut self, id: &str) -> Self {
        self.catalog.companions.insert(id.to_string());
        self
    }

    pub fn item(mut self, id: &str) -> Self {
        self.catalog.items.insert(id.to_string());
        self
    }

    pub fn quest(mut self, id: &str, stages: u32) -> Self {
        self.catalog.quest_stages.insert(id.to_string(), stages);
        self
    }

    pub fn build(self) -> WorldCatalog {
        self.catalog
    }
}

// =============================================================================
// Validated world
// =============================================================================

#[derive(Debug, Clone)]
pub struct World {
    content: WorldContent,
    catalog: WorldCatalog,
}

impl WorldContent {
    /// Checks the whole world, collecting every problem before failing.
    pub fn validate(self) -> Result<World, WorldValidationErrors> {
        let catalog = WorldCatalog::from_content(&self);
        let mut errors = Vec::new();

        if self.id.as_str().trim().is_empty() {
            errors.push(ValidationError::invalid("id", "world id is empty"));
        }

        check_unique("locations", self.locations.iter().map(|l| l.id.as_str()), &mut errors);
        check_unique("companions", self.companions.iter().map(|c| c.id.as_str()), &mut errors);
        check_unique("items", self.items.iter().map(|i| i.id.as_str()), &mut errors);
        check_unique("quests", self.quests.iter().map(|q| q.id.as_str()), &mut errors);
        check_unique("beats", self.beats.iter().map(|b| b.id.as_str()), &mut errors);
        check_unique("arcs", self.arcs.iter().map(|a| a.id.as_str()), &mut errors);

        self.validate_start(&catalog, &mut errors);

        for companion in &self.companions {
            if !(AFFINITY_MIN..=AFFINITY_MAX).contains(&companion.starting_affinity) {
                errors.push(ValidationError::invalid(
                    format!("companions[{}].starting_affinity", companion.id),
                    format!("must be within {AFFINITY_MIN}..={AFFINITY_MAX}"),
                ));
            }
        }

        for quest in &self.quests {
            validate_quest(quest, &catalog, &mut errors);
        }

        for beat in &self.beats {
            let path = format!("beats[{}]", beat.id);
            beat.trigger
                .validate(&format!("{path}.trigger"), &catalog, &mut errors);
            validate_all(
                &beat.consequences,
                &format!("{path}.consequences"),
                &catalog,
                &mut errors,
            );
        }

        let beat_ids: BTreeSet<&str> = self.beats.iter().map(|b| b.id.as_str()).collect();
        for arc in &self.arcs {
            let path = format!("arcs[{}]", arc.id);
            if arc.required_beats.is_empty() {
                errors.push(ValidationError::invalid(&path, "arc has no required beats"));
            }
            for beat in &arc.required_beats {
                if !beat_ids.contains(beat.as_str()) {
                    errors.push(ValidationError::unknown(
                        format!("{path}.required_beats"),
                        "beat",
                        beat.as_str(),
                    ));
                }
            }
            validate_all(
                &arc.completion_actions,
                &format!("{path}.completion_actions"),
                &catalog,
                &mut errors,
            );
        }

        if errors.is_empty() {
            Ok(World {
                content: self,
                catalog,
            })
        } else {
            Err(WorldValidationErrors {
                world: self.id.to_string(),
                errors,
            })
        }
    }

    fn validate_start(&self, catalog: &WorldCatalog, errors: &mut Vec<ValidationError>) {
        let start = &self.start;
        if !catalog.has_location(start.location.as_str()) {
            errors.push(ValidationError::unknown(
                "start.location",
                "location",
                start.location.as_str(),
            ));
        }
        if let Some(companion) = &start.active_companion {
            if !catalog.has_companion(companion.as_str()) {
                errors.push(ValidationError::unknown(
                    "start.active_companion",
                    "companion",
                    companion.as_str(),
                ));
            }
        }
        for item in start.inventory.keys() {
            if !catalog.has_item(item.as_str()) {
                errors.push(ValidationError::unknown("start.inventory", "item", item.as_str()));
            }
        }
    }
}

fn check_unique<'a>(
    path: &str,
    ids: impl Iterator<Item = &'a str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = BTreeSet::new();
    for id in ids {
        if id.trim().is_empty() {
            errors.push(ValidationError::invalid(path, "empty id"));
        } else if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId {
                path: path.to_string(),
                id: id.to_string(),
            });
        }
    }
}

fn validate_quest(quest: &QuestDefinition, catalog: &WorldCatalog, errors: &mut Vec<ValidationError>) {
    let path = format!("quests[{}]", quest.id);

    if quest.stages.is_empty() {
        errors.push(ValidationError::invalid(&path, "quest has no stages"));
    }
    check_unique(
        &format!("{path}.stages"),
        quest.stages.iter().map(|s| s.id.as_str()),
        errors,
    );

    for required in &quest.required_quests {
        if required == &quest.id {
            errors.push(ValidationError::invalid(
                format!("{path}.required_quests"),
                "quest cannot require itself",
            ));
        } else if !catalog.has_quest(required.as_str()) {
            errors.push(ValidationError::unknown(
                format!("{path}.required_quests"),
                "quest",
                required.as_str(),
            ));
        }
    }

    quest
        .start_condition
        .validate(&format!("{path}.start_condition"), catalog, errors);

    for (i, stage) in quest.stages.iter().enumerate() {
        let stage_path = format!("{path}.stages[{}]", i + 1);
        validate_all(
            &stage.entry_actions,
            &format!("{stage_path}.entry_actions"),
            catalog,
            errors,
        );
        stage
            .completion
            .validate(&format!("{stage_path}.completion"), catalog, errors);
        validate_all(
            &stage.completion_actions,
            &format!("{stage_path}.completion_actions"),
            catalog,
            errors,
        );
        if let Some(fail) = &stage.fail_condition {
            fail.validate(&format!("{stage_path}.fail_condition"), catalog, errors);
        }
        validate_all(
            &stage.fail_actions,
            &format!("{stage_path}.fail_actions"),
            catalog,
            errors,
        );
    }

    validate_all(&quest.rewards, &format!("{path}.rewards"), catalog, errors);
}

impl World {
    pub fn id(&self) -> &WorldKey {
        &self.content.id
    }

    pub fn title(&self) -> &str {
        &self.content.title
    }

    pub fn description(&self) -> &str {
        &self.content.description
    }

    pub fn catalog(&self) -> &WorldCatalog {
        &self.catalog
    }

    pub fn start(&self) -> &StartingState {
        &self.content.start
    }

    pub fn quests(&self) -> &[QuestDefinition] {
        &self.content.quests
    }

    pub fn beats(&self) -> &[StoryBeat] {
        &self.content.beats
    }

    pub fn arcs(&self) -> &[NarrativeArc] {
        &self.content.arcs
    }

    pub fn hard_limits(&self) -> &[String] {
        &self.content.hard_limits
    }

    pub fn location(&self, id: &LocationId) -> Option<&LocationDef> {
        self.content.locations.iter().find(|l| &l.id == id)
    }

    pub fn companion(&self, id: &CompanionId) -> Option<&CompanionDef> {
        self.content.companions.iter().find(|c| &c.id == id)
    }

    pub fn companions(&self) -> &[CompanionDef] {
        &self.content.companions
    }

    pub fn item(&self, id: &ItemId) -> Option<&ItemDef> {
        self.content.items.iter().find(|i| &i.id == id)
    }

    pub fn fallback_narrative(&self) -> &str {
        self.content
            .fallback_narrative
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_FALLBACK_NARRATIVE)
    }

    pub fn intro(&self) -> String {
        match &self.content.start.intro {
            Some(intro) if !intro.trim().is_empty() => intro.clone(),
            _ => {
                let place = self
                    .location(&self.content.start.location)
                    .map(|l| l.name.as_str())
                    .unwrap_or_else(|| self.content.start.location.as_str());
                format!("{}. Your story begins in {}.", self.content.title, place)
            }
        }
    }

    /// Fresh state for a new session: start block applied, companions at
    /// their starting affinity, every quest NotStarted.
    pub fn initial_state(&self, session_id: SessionId, now: DateTime<Utc>) -> GameState {
        let start = &self.content.start;
        let mut state = GameState::new(
            session_id,
            self.content.id.clone(),
            start.location.clone(),
            now,
        );
        state.time_of_day = start.time_of_day;
        state.active_companion = start.active_companion.clone();
        state.stats = start.stats.clone();
        state.flags = start.flags.clone();
        state.inventory = start
            .inventory
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(item, count)| (item.clone(), *count))
            .collect();
        state.affinity = self
            .content
            .companions
            .iter()
            .map(|c| (c.id.clone(), c.starting_affinity))
            .collect();
        state.unlocked_locations = self
            .content
            .locations
            .iter()
            .filter(|l| !l.locked)
            .map(|l| l.id.clone())
            .collect();
        state.unlocked_locations.insert(start.location.clone());
        state.quests = self
            .content
            .quests
            .iter()
            .map(|q| QuestRuntimeState::new(q.id.clone()))
            .collect();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::QuestStatus;

    const WORLD: &str = r#"{
        "id": "moonlit",
        "title": "Moonlit Academy",
        "start": { "location": "courtyard", "active_companion": "luna", "inventory": { "lantern": 1 } },
        "locations": [
            { "id": "courtyard", "name": "Courtyard" },
            { "id": "library", "name": "Library" },
            { "id": "tower", "name": "Old Tower", "locked": true }
        ],
        "companions": [ { "id": "luna", "name": "Luna", "starting_affinity": 10 } ],
        "items": [ { "id": "lantern", "name": "Lantern" } ],
        "quests": [
            {
                "id": "intro",
                "title": "First Steps",
                "start_condition": { "field": "location", "op": "eq", "value": "library" },
                "stages": [ { "id": "s1", "completion": { "field": "turn", "op": "gte", "value": 4 } } ]
            }
        ],
        "beats": [
            { "id": "meet", "trigger": { "field": "turn", "op": "eq", "value": 1 }, "priority": 5 }
        ],
        "arcs": [ { "id": "arc1", "title": "Arrival", "required_beats": ["meet"] } ]
    }"#;

    fn content() -> WorldContent {
        serde_json::from_str(WORLD).unwrap()
    }

    #[test]
    fn valid_world_builds_initial_state() {
        let world = content().validate().unwrap();
        let state = world.initial_state(SessionId::new(), Utc::now());

        assert_eq!(state.turn, 0);
        assert_eq!(state.location.as_str(), "courtyard");
        assert_eq!(state.affinity_of(&CompanionId::new("luna")), 10);
        assert_eq!(state.item_count(&ItemId::new("lantern")), 1);
        assert!(state.unlocked_locations.contains(&LocationId::new("library")));
        assert!(!state.unlocked_locations.contains(&LocationId::new("tower")));
        assert_eq!(state.quests.len(), 1);
        assert_eq!(state.quests[0].status, QuestStatus::NotStarted);
        assert_eq!(world.fallback_narrative(), DEFAULT_FALLBACK_NARRATIVE);
        assert!(world.intro().contains("Courtyard"));
    }

    #[test]
    fn collects_every_problem() {
        let mut content = content();
        content.start.location = LocationId::new("nowhere");
        content.arcs[0].required_beats.push("ghost".into());
        content.quests[0].required_quests.push("intro".into());

        let err = content.validate().unwrap_err();
        assert_eq!(err.errors.len(), 3);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut content = content();
        let dup = content.beats[0].clone();
        content.beats.push(dup);

        let err = content.validate().unwrap_err();
        assert!(err
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateId { id, .. } if id == "meet")));
    }
}

//! Loads world content from JSON and validates it.

use std::path::{Path, PathBuf};

use taleweaver_domain::{World, WorldContent, WorldValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum WorldLoadError {
    #[error("Failed to read world file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("World file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] WorldValidationErrors),
}

/// Parses and validates a world document.
pub fn parse_world(json: &str) -> Result<World, WorldLoadError> {
    let content: WorldContent = serde_json::from_str(json)?;
    Ok(content.validate()?)
}

/// Reads, parses and validates the world at `path`.
pub async fn load_world(path: impl AsRef<Path>) -> Result<World, WorldLoadError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| WorldLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let world = parse_world(&json)?;
    tracing::info!(
        world = %world.id(),
        quests = world.quests().len(),
        beats = world.beats().len(),
        arcs = world.arcs().len(),
        "World loaded"
    );
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = include_str!("../../../../worlds/moonlit.json");

    #[test]
    fn bundled_sample_world_is_valid() {
        let world = parse_world(SAMPLE).unwrap();
        assert_eq!(world.id().as_str(), "moonlit");
        assert!(!world.quests().is_empty());
        assert!(!world.beats().is_empty());
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let world = load_world(file.path()).await.unwrap();

        assert_eq!(world.title(), "Moonlit Academy");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_world(dir.path().join("nope.json")).await;
        assert!(matches!(result, Err(WorldLoadError::Io { .. })));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            parse_world("{ not json"),
            Err(WorldLoadError::Parse(_))
        ));
    }

    #[test]
    fn ill_typed_condition_is_rejected_at_load() {
        let json = r#"{
            "id": "w",
            "title": "W",
            "start": { "location": "hall" },
            "locations": [ { "id": "hall", "name": "Hall" } ],
            "beats": [
                { "id": "b", "trigger": { "field": "turn", "op": "eq", "value": "three" } }
            ]
        }"#;

        let Err(WorldLoadError::Invalid(errors)) = parse_world(json) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.errors.len(), 1);
    }
}

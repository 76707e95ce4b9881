use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::sim::World;

use super::level::{build_world, LevelDef, LevelError};

#[derive(Debug, Error)]
pub enum LevelLoadError {
    #[error("failed to read level file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse level json{location}: {source}")]
    Parse {
        location: ParseLocation,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Build(#[from] LevelError),
}

/// Where a parse error happened: the file (when there is one) and the JSON
/// path of the offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseLocation {
    pub file: Option<PathBuf>,
    pub field_path: Option<String>,
}

impl std::fmt::Display for ParseLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, " in {}", file.display())?;
        }
        if let Some(field_path) = &self.field_path {
            write!(f, " at {field_path}")?;
        }
        Ok(())
    }
}

pub fn parse_level(raw: &str) -> Result<LevelDef, LevelLoadError> {
    parse_level_from(raw, None)
}

fn parse_level_from(raw: &str, file: Option<&Path>) -> Result<LevelDef, LevelLoadError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, LevelDef>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let field_path = (!path.is_empty() && path != ".").then_some(path);
        LevelLoadError::Parse {
            location: ParseLocation {
                file: file.map(Path::to_path_buf),
                field_path,
            },
            source: error.into_inner(),
        }
    })
}

pub fn read_level_def(path: &Path) -> Result<LevelDef, LevelLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LevelLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_level_from(&raw, Some(path))
}

pub fn load_level(path: &Path) -> Result<World, LevelLoadError> {
    let level = read_level_def(path)?;
    info!(
        path = %path.display(),
        width = level.width,
        height = level.height,
        actor_count = level.actors.len(),
        "level_loaded"
    );
    Ok(build_world(&level)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::content::{ActorDef, ActorKind};
    use crate::sim::GridCoord;

    fn write_level(temp: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = temp.path().join(name);
        fs::write(&path, contents).expect("write level");
        path
    }

    #[test]
    fn loads_level_file_into_world() {
        let temp = TempDir::new().expect("temp");
        let level = LevelDef {
            width: 10,
            height: 1,
            actors: vec![
                ActorDef::new("u", ActorKind::Unit).at(0, 0),
                ActorDef::new("v", ActorKind::Crate).at(1, 0),
            ],
        };
        let raw = serde_json::to_string_pretty(&level).expect("encode");
        let path = write_level(&temp, "row.json", &raw);

        let world = load_level(&path).expect("load");

        assert_eq!(world.grid().width(), 10);
        let v = world.find_by_name("v").expect("v");
        assert_eq!(
            world.actor(v).and_then(|actor| actor.coordinates()),
            Some(GridCoord::new(1, 0))
        );
    }

    #[test]
    fn parse_error_names_field_path() {
        let raw = json!({
            "width": 3,
            "height": 3,
            "actors": [
                { "name": "ok", "kind": "crate", "at": { "x": 0, "y": 0 } },
                { "name": "bad", "kind": "dragon" }
            ]
        })
        .to_string();

        let err = parse_level(&raw).expect_err("unknown kind");
        match err {
            LevelLoadError::Parse { location, .. } => {
                assert_eq!(location.file, None);
                assert_eq!(location.field_path.as_deref(), Some("actors[1].kind"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = json!({ "width": 2, "height": 2, "actors": [], "gravity": 9.8 }).to_string();

        assert!(matches!(
            parse_level(&raw),
            Err(LevelLoadError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("absent.json");

        let err = load_level(&path).expect_err("missing");
        assert!(matches!(err, LevelLoadError::Read { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn build_errors_pass_through() {
        let temp = TempDir::new().expect("temp");
        let raw = json!({
            "width": 2,
            "height": 2,
            "actors": [{ "name": "player", "kind": "puppeteer", "controls": "ghost" }]
        })
        .to_string();
        let path = write_level(&temp, "orphan.json", &raw);

        let err = load_level(&path).expect_err("orphan puppeteer");
        assert!(matches!(
            err,
            LevelLoadError::Build(LevelError::UnknownPuppet { .. })
        ));
    }
}

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tactics_engine::sim::behavior::builtin;
use tactics_engine::{
    ActorDef, ActorKind, AnimationDef, GridCoord, InputBuffer, Key, KeyRecord, LevelDef,
    Simulation,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Small room: a unit with two crates in front of it, a wall, a torch and a
/// drifting unit along the bottom row.
pub(crate) fn demo_level() -> LevelDef {
    let mut hero = ActorDef::new("hero", ActorKind::Unit).at(1, 2);
    hero.push_force = Some(2);

    let mut drifter = ActorDef::new("drifter", ActorKind::Unit).at(0, 4);
    drifter.intent_velocity = Some(tactics_engine::sim::Vec2::new(0.5, 0.0));

    let mut torch = ActorDef::new("torch", ActorKind::StaticObject).at(7, 0);
    torch.collision = Some(tactics_engine::sim::CollisionCategory::Overlap);
    torch.animation = Some(AnimationDef {
        name: "flicker".to_string(),
        frames: 3,
        frame_seconds: 0.2,
    });

    LevelDef {
        width: 8,
        height: 5,
        actors: vec![
            hero,
            ActorDef::new("crate_a", ActorKind::Crate).at(2, 2),
            ActorDef::new("crate_b", ActorKind::Crate).at(3, 2),
            ActorDef::new("wall", ActorKind::StaticObject).at(6, 2),
            drifter,
            torch,
            ActorDef::new("cursor", ActorKind::Cursor),
            ActorDef::new("player", ActorKind::Puppeteer).controlling("hero"),
        ],
    }
}

pub(crate) fn demo_script() -> InputScript {
    InputScript::new(vec![
        ScriptStep::key(2, "player", Key::Right, true),
        ScriptStep::key(3, "player", Key::Right, false),
        ScriptStep::place(4, "cursor", GridCoord::new(3, 3)),
        ScriptStep::key(6, "player", Key::Right, true),
        ScriptStep::key(7, "player", Key::Right, false),
        ScriptStep::key(10, "player", Key::Right, true),
        ScriptStep::key(11, "player", Key::Right, false),
        ScriptStep::key(14, "player", Key::Up, true),
        ScriptStep::key(15, "player", Key::Up, false),
        ScriptStep::place(16, "cursor", GridCoord::new(5, 1)),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum ScriptAction {
    Key { key: Key, down: bool },
    Place { at: GridCoord },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ScriptStep {
    pub(crate) tick: u64,
    pub(crate) actor: String,
    #[serde(flatten)]
    pub(crate) action: ScriptAction,
}

impl ScriptStep {
    fn key(tick: u64, actor: &str, key: Key, down: bool) -> Self {
        Self {
            tick,
            actor: actor.to_string(),
            action: ScriptAction::Key { key, down },
        }
    }

    fn place(tick: u64, actor: &str, at: GridCoord) -> Self {
        Self {
            tick,
            actor: actor.to_string(),
            action: ScriptAction::Place { at },
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ScriptError {
    #[error("failed to read input script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse input script {path} at {field_path}: {source}")]
    Parse {
        path: PathBuf,
        field_path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Timed input for headless runs. Steps fire on the tick they name, in
/// order, each at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct InputScript {
    steps: Vec<ScriptStep>,
    next: usize,
}

impl InputScript {
    pub(crate) fn new(mut steps: Vec<ScriptStep>) -> Self {
        steps.sort_by_key(|step| step.tick);
        Self { steps, next: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.next >= self.steps.len()
    }

    /// Applies every step due by the upcoming tick.
    pub(crate) fn feed(
        &mut self,
        simulation: &mut Simulation,
        input: &mut InputBuffer,
        ms_per_tick: u64,
    ) {
        let upcoming = simulation.tick_count() + 1;
        while let Some(step) = self.steps.get(self.next).filter(|step| step.tick <= upcoming) {
            self.next += 1;
            let Some(actor) = simulation.world().find_by_name(&step.actor) else {
                warn!(actor = step.actor.as_str(), tick = step.tick, "script_actor_missing");
                continue;
            };
            debug!(actor = %actor, tick = step.tick, action = ?step.action, "script_step");
            match step.action {
                ScriptAction::Key { key, down } => {
                    let timestamp_ms = step.tick.saturating_mul(ms_per_tick);
                    let record = if down {
                        KeyRecord::pressed(timestamp_ms, key)
                    } else {
                        KeyRecord::released(timestamp_ms, key)
                    };
                    input.record(actor, record);
                }
                ScriptAction::Place { at } => {
                    if let Some(cursor) = simulation.world_mut().actor_mut(actor) {
                        builtin::request_placement(cursor, at);
                    }
                }
            }
        }
    }
}

pub(crate) fn parse_script(raw: &str, path: &Path) -> Result<InputScript, ScriptError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, Vec<ScriptStep>>(&mut deserializer) {
        Ok(steps) => Ok(InputScript::new(steps)),
        Err(error) => Err(ScriptError::Parse {
            path: path.to_path_buf(),
            field_path: error.path().to_string(),
            source: error.into_inner(),
        }),
    }
}

pub(crate) fn read_script(path: &Path) -> Result<InputScript, ScriptError> {
    let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&raw, path)
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::sim::behavior::builtin::{
    self, AnimationState, ANIMATION, BUFFERED_MOVEMENT, CURSOR_PLACEMENT, MOVEMENT, PUPPETEER,
    PUSHABLE,
};
use crate::sim::{
    ActorDesc, ActorId, Body, Capability, CollisionCategory, CoordinateHolder, Grid, GridCoord,
    GridError, ShapeRef, Vec2, World, WorldError,
};

/// Shortest animation frame a level may declare.
pub const MIN_FRAME_SECONDS: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Unit,
    StaticObject,
    Crate,
    Cursor,
    Puppeteer,
}

impl ActorKind {
    fn default_category(self) -> CollisionCategory {
        match self {
            Self::Unit | Self::StaticObject | Self::Crate => CollisionCategory::Block,
            Self::Cursor | Self::Puppeteer => CollisionCategory::Ignore,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::StaticObject => "static_object",
            Self::Crate => "crate",
            Self::Cursor => "cursor",
            Self::Puppeteer => "puppeteer",
        }
    }

    fn needs_coordinates(self) -> bool {
        matches!(self, Self::Unit | Self::StaticObject | Self::Crate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimationDef {
    pub name: String,
    pub frames: u32,
    pub frame_seconds: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorDef {
    pub name: String,
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<GridCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision: Option<CollisionCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_force: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_velocity: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationDef>,
    /// Name of the unit a puppeteer steers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inactive: bool,
}

impl ActorDef {
    pub fn new(name: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            at: None,
            collision: None,
            shape: None,
            push_force: None,
            intent_velocity: None,
            animation: None,
            controls: None,
            inactive: false,
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.at = Some(GridCoord::new(x, y));
        self
    }

    pub fn controlling(mut self, unit: impl Into<String>) -> Self {
        self.controls = Some(unit.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelDef {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub actors: Vec<ActorDef>,
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("actors[{index}] `{name}`: {kind:?} needs grid coordinates")]
    MissingCoordinates {
        index: usize,
        name: String,
        kind: ActorKind,
    },
    #[error("actors[{index}] `{name}`: puppeteer has no `controls` target")]
    MissingPuppet { index: usize, name: String },
    #[error("actors[{index}] `{name}`: `controls` only applies to puppeteers")]
    UnexpectedControls { index: usize, name: String },
    #[error("puppeteer `{puppeteer}` controls `{target}`, which is not a unit in this level")]
    UnknownPuppet { puppeteer: String, target: String },
    #[error("actors[{index}] `{name}`: animation needs at least one frame")]
    EmptyAnimation { index: usize, name: String },
    #[error(
        "actors[{index}] `{name}`: frame_seconds {frame_seconds} must be finite and at least {min}",
        min = MIN_FRAME_SECONDS
    )]
    InvalidFrameDuration {
        index: usize,
        name: String,
        frame_seconds: f32,
    },
}

/// Builds a fully populated world from a level description.
///
/// Actors spawn in declaration order, so their ids follow the file. Puppeteer
/// links are resolved after every actor exists.
pub fn build_world(level: &LevelDef) -> Result<World, LevelError> {
    let mut world = World::new(Grid::new(level.width, level.height)?);
    let mut units = HashSet::new();
    let mut links: Vec<(ActorId, &str, &str)> = Vec::new();

    for (index, def) in level.actors.iter().enumerate() {
        validate_actor(index, def)?;
        let id = world.spawn(actor_desc(def))?;

        if let Some(actor) = world.actor_mut(id) {
            if let Some(push_force) = def.push_force {
                builtin::set_push_force(actor, push_force);
            }
            if let Some(animation) = &def.animation {
                builtin::set_animation(
                    actor,
                    AnimationState::new(
                        animation.name.clone(),
                        animation.frames,
                        animation.frame_seconds,
                    ),
                );
            }
        }

        if def.kind == ActorKind::Unit {
            units.insert(def.name.as_str());
        }
        if let Some(target) = &def.controls {
            links.push((id, def.name.as_str(), target.as_str()));
        }
        debug!(actor = %id, name = def.name.as_str(), kind = ?def.kind, "level_actor_spawned");
    }

    for (puppeteer, puppeteer_name, target) in links {
        let controlled = units
            .contains(target)
            .then(|| world.find_by_name(target))
            .flatten()
            .ok_or_else(|| LevelError::UnknownPuppet {
                puppeteer: puppeteer_name.to_string(),
                target: target.to_string(),
            })?;
        if let Some(actor) = world.actor_mut(puppeteer) {
            builtin::assign_puppet(actor, controlled);
        }
    }

    info!(
        width = level.width,
        height = level.height,
        actor_count = world.actor_count(),
        "level_built"
    );
    Ok(world)
}

fn validate_actor(index: usize, def: &ActorDef) -> Result<(), LevelError> {
    if def.kind.needs_coordinates() && def.at.is_none() {
        return Err(LevelError::MissingCoordinates {
            index,
            name: def.name.clone(),
            kind: def.kind,
        });
    }
    match (def.kind, &def.controls) {
        (ActorKind::Puppeteer, None) => {
            return Err(LevelError::MissingPuppet {
                index,
                name: def.name.clone(),
            })
        }
        (ActorKind::Puppeteer, Some(_)) | (_, None) => {}
        (_, Some(_)) => {
            return Err(LevelError::UnexpectedControls {
                index,
                name: def.name.clone(),
            })
        }
    }
    if let Some(animation) = &def.animation {
        if animation.frames == 0 {
            return Err(LevelError::EmptyAnimation {
                index,
                name: def.name.clone(),
            });
        }
        if !animation.frame_seconds.is_finite() || animation.frame_seconds < MIN_FRAME_SECONDS {
            return Err(LevelError::InvalidFrameDuration {
                index,
                name: def.name.clone(),
                frame_seconds: animation.frame_seconds,
            });
        }
    }
    Ok(())
}

fn actor_desc(def: &ActorDef) -> ActorDesc {
    let mut desc = ActorDesc::new().named(def.name.clone());
    desc = match def.kind {
        ActorKind::Unit => desc
            .with_behavior(MOVEMENT)
            .with_behavior(PUSHABLE)
            .with_behavior(BUFFERED_MOVEMENT)
            .with_capability(Capability::Unit),
        ActorKind::StaticObject => desc,
        ActorKind::Crate => desc.with_behavior(PUSHABLE),
        ActorKind::Cursor => desc.with_behavior(CURSOR_PLACEMENT),
        ActorKind::Puppeteer => desc
            .with_behavior(PUPPETEER)
            .with_capability(Capability::Puppeteer),
    };
    if def.animation.is_some() {
        desc = desc.with_behavior(ANIMATION);
    }

    if def.kind != ActorKind::Puppeteer {
        let category = def.collision.unwrap_or(def.kind.default_category());
        let shape = def.shape.as_deref().unwrap_or(def.kind.as_str());
        let mut holder =
            CoordinateHolder::new(Body::new(category)).with_shape(ShapeRef::new(shape));
        if let Some(intent) = def.intent_velocity {
            holder = holder.with_intent_velocity(intent);
        }
        desc = desc.with_coordinate_holder(holder);
    }
    if let Some(at) = def.at {
        desc = desc.at(at);
    }
    if def.inactive {
        desc = desc.inactive();
    }
    desc
}

mod level;
mod loader;

pub use level::{
    build_world, ActorDef, ActorKind, AnimationDef, LevelDef, LevelError, MIN_FRAME_SECONDS,
};
pub use loader::{load_level, parse_level, read_level_def, LevelLoadError, ParseLocation};

pub mod app;
pub mod content;
pub mod sim;

pub use app::{
    plan_sim_steps, run_headless, run_level, AppError, FixedStepClock, FrameSummary,
    HeadlessRunner, LoopConfig, LoopMetricsSnapshot, MetricsHandle, RunSummary, StepPlan,
};
pub use content::{
    build_world, load_level, parse_level, read_level_def, ActorDef, ActorKind, AnimationDef,
    LevelDef, LevelError, LevelLoadError, ParseLocation,
};
pub use sim::{
    ActorDesc, ActorId, Capability, Direction, GridCoord, InputBuffer, Key, KeyRecord,
    MessageType, Payload, PresentationEvent, PresentationSink, RecordingSink, Simulation,
    TickInput, TickReport, World,
};

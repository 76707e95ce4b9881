mod loop_runner;
mod metrics;

pub use loop_runner::{
    plan_sim_steps, run_headless, run_level, AppError, FixedStepClock, FrameSummary,
    HeadlessRunner, LoopConfig, RunSummary, StepPlan,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::content::{load_level, LevelLoadError};
use crate::sim::{InputBuffer, PresentationSink, Simulation, TickReport, WorldError};

use super::metrics::MetricsAccumulator;
use super::MetricsHandle;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many ticks; `None` runs until the process is stopped.
    pub max_ticks: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 20,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Level(#[from] LevelLoadError),
    #[error("failed to set up simulation: {0}")]
    Simulation(#[from] WorldError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

pub fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

/// Accumulates frame time and hands out whole fixed ticks.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    accumulator: Duration,
}

impl FixedStepClock {
    pub fn new(config: &LoopConfig) -> Self {
        let target_tps = config.target_tps.max(1);
        Self {
            fixed_dt: Duration::from_secs_f64(1.0 / target_tps as f64),
            max_frame_delta: normalize_non_zero_duration(
                config.max_frame_delta,
                Duration::from_millis(250),
            ),
            max_ticks_per_frame: config.max_ticks_per_frame.max(1),
            accumulator: Duration::ZERO,
        }
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    pub fn advance(&mut self, frame_dt: Duration) -> StepPlan {
        let clamped = frame_dt.min(self.max_frame_delta);
        let accumulator = self.accumulator.saturating_add(clamped);
        let plan = plan_sim_steps(accumulator, self.fixed_dt, self.max_ticks_per_frame);
        self.accumulator = plan.remaining_accumulator;

        if plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = self.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }
        plan
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub ticks_run: u32,
    pub changed_ticks: u32,
    pub dropped_backlog: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub changed_ticks: u64,
    pub resolved_actions: u64,
    pub dropped_actions: u64,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if report.state_changed() {
            self.changed_ticks += 1;
        }
        self.resolved_actions += u64::from(report.pipeline.resolved);
        self.dropped_actions += report.pipeline.dropped.len() as u64;
    }
}

/// Drives a simulation at a fixed tick rate without a window. Presentation
/// events are handed to the sink after every tick that produced any.
pub struct HeadlessRunner {
    simulation: Simulation,
    clock: FixedStepClock,
    input: InputBuffer,
    metrics: MetricsAccumulator,
    metrics_handle: MetricsHandle,
    tick_limit: Option<u64>,
    summary: RunSummary,
}

impl HeadlessRunner {
    pub fn new(simulation: Simulation, config: &LoopConfig, metrics_handle: MetricsHandle) -> Self {
        let metrics_log_interval =
            normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
        Self {
            simulation,
            clock: FixedStepClock::new(config),
            input: InputBuffer::default(),
            metrics: MetricsAccumulator::new(metrics_log_interval),
            metrics_handle,
            tick_limit: config.max_ticks,
            summary: RunSummary::default(),
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    pub fn input_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.tick_limit
            .is_some_and(|limit| self.simulation.tick_count() >= limit)
    }

    /// Lets a driver script queue input or poke the world before the next frame.
    pub fn feed(&mut self, script: &mut impl FnMut(&mut Simulation, &mut InputBuffer)) {
        script(&mut self.simulation, &mut self.input);
    }

    pub fn advance(
        &mut self,
        frame_dt: Duration,
        now: Instant,
        sink: &mut dyn PresentationSink,
    ) -> FrameSummary {
        let plan = self.clock.advance(frame_dt);
        let mut frame = FrameSummary {
            dropped_backlog: plan.dropped_backlog,
            ..FrameSummary::default()
        };

        for _ in 0..plan.ticks_to_run {
            if self.is_finished() {
                break;
            }
            let report = self.step(sink);
            frame.ticks_run += 1;
            if report.state_changed() {
                frame.changed_ticks += 1;
            }
        }

        self.metrics.record_frame(frame_dt);
        if let Some(snapshot) = self.metrics.maybe_snapshot(now) {
            self.metrics_handle.publish(snapshot);
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                changed_tick_ratio = snapshot.changed_tick_ratio,
                resolved_per_second = snapshot.resolved_per_second,
                dropped_per_second = snapshot.dropped_per_second,
                actor_count = self.simulation.world().actor_count(),
                "loop_metrics"
            );
        }
        frame
    }

    /// Runs exactly one tick with whatever input has been buffered.
    pub fn step(&mut self, sink: &mut dyn PresentationSink) -> TickReport {
        let input = self.input.take_tick_input();
        let delta_seconds = self.clock.fixed_dt().as_secs_f32();
        let report = self.simulation.process_tick(delta_seconds, input);
        self.metrics.record_tick(&report);
        self.summary.record(&report);

        let events = self.simulation.drain_events();
        if !events.is_empty() {
            sink.present(&events);
        }
        report
    }
}

/// Real-time loop: sleeps to the tick rate and stops at `max_ticks`.
pub fn run_headless(
    config: LoopConfig,
    simulation: Simulation,
    metrics_handle: MetricsHandle,
    sink: &mut dyn PresentationSink,
    mut script: impl FnMut(&mut Simulation, &mut InputBuffer),
) -> RunSummary {
    let mut runner = HeadlessRunner::new(simulation, &config, metrics_handle);
    let fixed_dt = runner.clock.fixed_dt();
    info!(
        target_tps = config.target_tps.max(1),
        max_frame_delta_ms = config.max_frame_delta.as_millis() as u64,
        max_ticks_per_frame = config.max_ticks_per_frame.max(1),
        metrics_log_interval_ms = config.metrics_log_interval.as_millis() as u64,
        max_ticks = ?config.max_ticks,
        "loop_config"
    );

    // Present spawn-time activations before the first tick.
    let initial = runner.simulation.drain_events();
    if !initial.is_empty() {
        sink.present(&initial);
    }

    let mut last_frame_instant = Instant::now();
    while !runner.is_finished() {
        runner.feed(&mut script);

        let elapsed = Instant::now().saturating_duration_since(last_frame_instant);
        let sleep = compute_cap_sleep(elapsed, fixed_dt);
        if sleep > Duration::ZERO {
            thread::sleep(sleep);
        }

        let now = Instant::now();
        let frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;
        runner.advance(frame_dt, now, sink);
    }

    let summary = runner.summary();
    info!(
        ticks = summary.ticks,
        changed_ticks = summary.changed_ticks,
        resolved_actions = summary.resolved_actions,
        dropped_actions = summary.dropped_actions,
        "run_finished"
    );
    summary
}

pub fn run_level(
    config: LoopConfig,
    level_path: &Path,
    metrics_handle: MetricsHandle,
    sink: &mut dyn PresentationSink,
    script: impl FnMut(&mut Simulation, &mut InputBuffer),
) -> Result<RunSummary, AppError> {
    let world = load_level(level_path)?;
    let simulation = Simulation::with_builtins(world)?;
    info!(
        level = %level_path.display(),
        actor_count = simulation.world().actor_count(),
        "simulation_ready"
    );
    Ok(run_headless(config, simulation, metrics_handle, sink, script))
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_cap_sleep(elapsed: Duration, target: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

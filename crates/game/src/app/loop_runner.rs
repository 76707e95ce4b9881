use std::process::ExitCode;

use tactics_engine::{
    build_world, run_headless, run_level, AppError, InputBuffer, LevelLoadError, MetricsHandle,
    RunSummary, Simulation,
};
use tracing::{error, info};

use super::bootstrap::{AppWiring, LevelSource};
use super::scenario;
use super::sink::LogSink;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let mut script = match app.script.load() {
        Ok(script) => script,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    if script.is_empty() {
        info!("running without input script");
    }

    let mut sink = LogSink::default();
    let ms_per_tick = 1000 / u64::from(app.config.target_tps.max(1));
    let driver = |simulation: &mut Simulation, input: &mut InputBuffer| {
        script.feed(simulation, input, ms_per_tick);
    };

    match run_app(app, &mut sink, driver) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                changed_ticks = summary.changed_ticks,
                dropped_actions = summary.dropped_actions,
                presented_events = sink.presented(),
                script_finished = script.is_done(),
                "shutdown"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_app(
    app: AppWiring,
    sink: &mut LogSink,
    driver: impl FnMut(&mut Simulation, &mut InputBuffer),
) -> Result<RunSummary, AppError> {
    let metrics = MetricsHandle::default();
    match app.level {
        LevelSource::File(path) => run_level(app.config, &path, metrics, sink, driver),
        LevelSource::Demo => {
            let world = build_world(&scenario::demo_level()).map_err(LevelLoadError::from)?;
            let simulation = Simulation::with_builtins(world)?;
            info!(actor_count = simulation.world().actor_count(), "demo_level_ready");
            Ok(run_headless(app.config, simulation, metrics, sink, driver))
        }
    }
}

#[cfg(test)]
mod tests {
    use tactics_engine::LoopConfig;

    use super::*;
    use crate::app::bootstrap::ScriptSource;

    #[test]
    fn demo_run_finishes_at_tick_limit() {
        let app = AppWiring {
            config: LoopConfig {
                target_tps: 200,
                max_ticks: Some(20),
                ..LoopConfig::default()
            },
            level: LevelSource::Demo,
            script: ScriptSource::Demo,
        };
        let mut script = app.script.load().expect("script");
        let mut sink = LogSink::default();

        let summary = run_app(app, &mut sink, |simulation, input| {
            script.feed(simulation, input, 5)
        })
        .expect("run");

        assert_eq!(summary.ticks, 20);
        assert!(summary.changed_ticks > 0);
        assert!(sink.presented() > 0);
    }
}

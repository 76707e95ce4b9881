use std::env;
use std::path::PathBuf;

use tactics_engine::LoopConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::scenario::{self, InputScript};

pub(crate) const LEVEL_ENV_VAR: &str = "TACTICS_LEVEL";
pub(crate) const SCRIPT_ENV_VAR: &str = "TACTICS_SCRIPT";
pub(crate) const TPS_ENV_VAR: &str = "TACTICS_TPS";
pub(crate) const MAX_TICKS_ENV_VAR: &str = "TACTICS_MAX_TICKS";

const DEFAULT_MAX_TICKS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LevelSource {
    Demo,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScriptSource {
    Demo,
    File(PathBuf),
    None,
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) level: LevelSource,
    pub(crate) script: ScriptSource,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Tactics Startup ===");

    let defaults = LoopConfig::default();
    let target_tps = resolve_u64_env(TPS_ENV_VAR, u64::from(defaults.target_tps))
        .clamp(1, u64::from(u32::MAX)) as u32;
    let max_ticks = match resolve_u64_env(MAX_TICKS_ENV_VAR, DEFAULT_MAX_TICKS) {
        0 => None,
        ticks => Some(ticks),
    };
    let level = match env_path(LEVEL_ENV_VAR) {
        Some(path) => LevelSource::File(path),
        None => LevelSource::Demo,
    };
    let script = match (env_path(SCRIPT_ENV_VAR), &level) {
        (Some(path), _) => ScriptSource::File(path),
        (None, LevelSource::Demo) => ScriptSource::Demo,
        (None, LevelSource::File(_)) => ScriptSource::None,
    };

    AppWiring {
        config: LoopConfig {
            target_tps,
            max_ticks,
            ..defaults
        },
        level,
        script,
    }
}

impl ScriptSource {
    pub(crate) fn load(&self) -> Result<InputScript, scenario::ScriptError> {
        match self {
            Self::Demo => Ok(scenario::demo_script()),
            Self::File(path) => scenario::read_script(path),
            Self::None => Ok(InputScript::default()),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn env_path(var: &'static str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn resolve_u64_env(var: &'static str, fallback: u64) -> u64 {
    parse_u64_override(var, env::var(var), fallback)
}

fn parse_u64_override(
    var: &'static str,
    raw: Result<String, env::VarError>,
    fallback: u64,
) -> u64 {
    match raw {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = var,
                    value = value.as_str(),
                    "invalid env var value; falling back to default"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = var,
                error = %err,
                "unable to read env var; falling back to default"
            );
            fallback
        }
    }
}

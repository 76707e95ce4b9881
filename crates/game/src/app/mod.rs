mod bootstrap;
mod loop_runner;
mod scenario;
mod sink;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;

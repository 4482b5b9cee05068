use std::sync::Arc;

use config::Config;
use runner::ProcessRunner;

pub mod config;
pub mod middleware;
pub mod rate_limiter;
pub mod router;
pub mod routes;
pub mod runner;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub runner: Arc<ProcessRunner>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let runner = Arc::new(ProcessRunner::from_config(&config));
        Self { config, runner }
    }
}

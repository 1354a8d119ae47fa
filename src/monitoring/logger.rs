use serde::Serialize;
use tracing::info;

use crate::types::AppConfig;

#[derive(Serialize)]
struct StartupLog<'a> {
    event: &'a str,
    command: &'a str,
    strategies: Vec<String>,
    timezone: &'a str,
    state_path: String,
}

pub fn log_startup(cfg: &AppConfig, command: &str) {
    let mut strategies = cfg.source.strategies.clone();
    strategies.sort();
    strategies.dedup();
    let payload = StartupLog {
        event: "startup",
        command,
        strategies: strategies
            .iter()
            .map(|s| format!("{s:?}").to_lowercase())
            .collect(),
        timezone: cfg.market.timezone.name(),
        state_path: cfg.storage.state_path.display().to_string(),
    };
    info!(target: "tracker", startup = serde_json::to_string(&payload).unwrap_or_default().as_str());
}

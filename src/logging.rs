use crate::config::PanelConfig;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_tracing(config: &PanelConfig) {
    let filter =
        EnvFilter::try_new(config.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json_logs {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

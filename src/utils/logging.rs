use crate::core::config::{ConfigError, PipelineConfig};
use tracing::level_filters::LevelFilter;

/// Install a global fmt subscriber at `level`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(level: LevelFilter) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Install the subscriber at the configured severity floor
pub fn init_from_config(config: &PipelineConfig) -> Result<bool, ConfigError> {
    Ok(init_tracing(config.level_filter()?))
}

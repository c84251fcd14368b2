pub mod backoff;
pub mod commands;
pub mod replay;
pub mod watch;

pub use commands::{Cli, Commands};

use std::path::Path;

use songwatch::config::{parse_config, MonitorSettings};
use songwatch::errors::SongwatchError;

/// Settings from an optional config file, falling back to defaults.
pub async fn load_settings(config: Option<&str>) -> Result<MonitorSettings, SongwatchError> {
    match config {
        Some(path) => {
            let config = parse_config(Path::new(path)).await?;
            Ok(MonitorSettings::from_config(&config))
        }
        None => Ok(MonitorSettings::default()),
    }
}

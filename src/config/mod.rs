pub mod parser;
pub mod schema;
pub mod settings;
pub mod types;

pub use types::*;
pub use parser::{parse_config, parse_config_str};
pub use settings::MonitorSettings;

pub mod types;
pub mod classification;

pub use types::SongwatchError;
pub use classification::ErrorClassification;

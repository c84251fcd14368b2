pub mod formatting;
pub mod observers;
pub mod timer;
pub mod truncation;

pub use observers::{ObserverHandle, ObserverSet};
pub use timer::{schedule_once, schedule_repeating, TimerHandle};

pub mod progress;
pub mod renderer;

pub use progress::WatchProgress;

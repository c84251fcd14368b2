pub mod cache;
pub mod projector;
pub mod view;

pub use cache::ProgressCache;
pub use projector::{project, DEFAULT_TOTAL_EXPECTED_NODES, FIX_NODE};
pub use view::{NodeProgress, NodeStatus, ProgressView};

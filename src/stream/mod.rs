pub mod buffer;
pub mod registry;

pub use buffer::{EventBuffer, DEFAULT_MAX_EVENTS};
pub use registry::{BufferChange, ChangeKind, NoUpstream, RunRegistry, RunSubscription, UpstreamLink};

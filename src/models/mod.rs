pub mod connection;
pub mod event;

pub use connection::*;
pub use event::*;

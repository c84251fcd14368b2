pub mod backoff;
pub mod countdown;
pub mod manager;
pub mod state;
pub mod transport;
pub mod websocket;

pub use backoff::BackoffPolicy;
pub use countdown::ReconnectCountdown;
pub use manager::ConnectionManager;
pub use state::{ConnectionStateMachine, RetryDecision};
pub use transport::{InboundMessage, OutboundMessage, Transport, TransportSession};
pub use websocket::WebSocketTransport;

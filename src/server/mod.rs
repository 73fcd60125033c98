//! Tunnel server implementation.
//!
//! - [`TunnelServer`] - accept loop, one task per connection
//! - Session lifecycle: path check, handshake, upstream dial, teardown
//! - Forwarding: the WebSocket -> TCP and TCP -> WebSocket pumps

mod forward;
mod listener;
mod session;
mod upstream;

pub use listener::TunnelServer;
pub use session::SessionSettings;

//! Wire surface of the tunnel endpoint.
//!
//! - [`TunnelRequest`] - the JSON handshake naming the TCP target
//! - [`Rejection`] - close codes sent when a session is refused
//!
//! After a successful handshake there are no further control messages:
//! every WebSocket message is raw payload.

mod close;
mod handshake;

pub use close::*;
pub use handshake::*;

/// The only request path that is accepted for tunnelling
pub const TUNNEL_PATH: &str = "/tunnel";

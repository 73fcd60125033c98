use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::session::{self, SessionSettings};

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts WebSocket connections and hands each to its own session task
pub struct TunnelServer {
    listener: TcpListener,
    settings: SessionSettings,
}

impl TunnelServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A, settings: SessionSettings) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, settings })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Sessions already running are detached and keep going.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    tokio::spawn(session::handle_connection(stream, peer, self.settings));
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::protocol::TunnelRequest;

/// Open the TCP connection a tunnel request asks for.
///
/// Ports outside the `u16` range fail here rather than at handshake
/// parsing, so they surface as upstream failures.
pub async fn connect(request: &TunnelRequest, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let port = u16::try_from(request.port).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("port {} out of range", request.port),
        )
    })?;

    bounded(TcpStream::connect((request.host.as_str(), port)), timeout).await
}

/// Run `dial` under an optional deadline; an elapsed deadline is `TimedOut`.
async fn bounded<F, T>(dial: F, timeout: Option<Duration>) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, dial)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out"))?,
        None => dial.await,
    }
}

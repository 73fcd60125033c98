//! The two byte pumps of a session.
//!
//! Both directions watch a shared [`CancellationToken`] at every point
//! where they can block, so the session can stop the survivor as soon as
//! its sibling finishes.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ForwardError;

/// Read size for the TCP side; each read becomes one binary message.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Relay WebSocket messages to the TCP writer until the client goes away
/// or the session is cancelled.
///
/// The writer is shut down before returning, whatever the outcome.
/// Returns the number of payload bytes written.
pub async fn websocket_to_tcp<S, W>(
    source: &mut S,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, ForwardError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = relay_messages(source, writer, cancel).await;

    if let Err(e) = writer.shutdown().await {
        debug!("TCP shutdown failed: {}", e);
    }

    result
}

async fn relay_messages<S, W>(
    source: &mut S,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, ForwardError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut forwarded = 0u64;

    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(forwarded),
            message = source.next() => message,
        };

        let payload = match message {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Close(frame))) => {
                debug!("WebSocket closed by client: {:?}", frame);
                return Ok(forwarded);
            }
            // Ping/pong are answered by tungstenite itself
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(forwarded),
        };

        if payload.is_empty() {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(forwarded),
            written = write_and_flush(writer, &payload) => written?,
        }
        forwarded += payload.len() as u64;
    }
}

async fn write_and_flush<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Relay TCP bytes to the WebSocket as binary messages until the TCP peer
/// signals EOF or the session is cancelled.
///
/// The WebSocket is left open; closing it belongs to session teardown.
/// Returns the number of payload bytes sent.
pub async fn tcp_to_websocket<R, S>(
    reader: &mut R,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<u64, ForwardError>
where
    R: AsyncRead + Unpin,
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut forwarded = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(forwarded),
            read = reader.read(&mut buf) => read?,
        };

        if n == 0 {
            debug!("TCP peer closed the stream");
            return Ok(forwarded);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(forwarded),
            sent = sink.send(Message::Binary(buf[..n].to_vec())) => sent?,
        }
        forwarded += n as u64;
    }
}

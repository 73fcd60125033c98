use futures_util::{Stream, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        self,
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
        Message,
    },
    WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ForwardError, HandshakeError};
use crate::protocol::{Rejection, TunnelRequest, TUNNEL_PATH};

use super::{forward, upstream};

/// How long to wait for the client's half of a closing handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-session limits, shared by value with every session
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    /// Largest inbound WebSocket message or frame; `None` is unbounded
    pub max_message_size: Option<usize>,
    /// Upper bound on the upstream dial; `None` waits for the OS
    pub connect_timeout: Option<Duration>,
}

impl SessionSettings {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_message_size;
        config
    }
}

/// Drive one accepted connection from WebSocket upgrade to teardown.
///
/// Never returns an error: every failure is resolved here, either by a
/// close frame to the client or by dropping the connection.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, settings: SessionSettings) {
    let mut path = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        // Full request target: a query string makes it a different endpoint
        path = request.uri().path_and_query().map(|target| target.as_str().to_string());
        Ok(response)
    };

    let mut websocket =
        match accept_hdr_async_with_config(stream, callback, Some(settings.websocket_config()))
            .await
        {
            Ok(websocket) => websocket,
            Err(e) => {
                debug!("WebSocket upgrade failed for {}: {}", peer, e);
                return;
            }
        };

    if path.as_deref() != Some(TUNNEL_PATH) {
        debug!("Rejecting {}: unsupported path {:?}", peer, path);
        close_gracefully(websocket, Rejection::UnsupportedPath.close_frame()).await;
        return;
    }

    let request = match read_handshake(&mut websocket).await {
        Some(Ok(request)) => request,
        Some(Err(e)) => {
            warn!("Invalid handshake: {}", e);
            close_gracefully(websocket, Rejection::InvalidHandshake.close_frame()).await;
            return;
        }
        None => return,
    };

    let upstream = match upstream::connect(&request, settings.connect_timeout).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(
                "Failed to connect to {}:{}: {}",
                request.host, request.port, e
            );
            close_gracefully(websocket, Rejection::UpstreamFailed.close_frame()).await;
            return;
        }
    };

    info!("Tunnel established to {}:{}", request.host, request.port);
    Session::new(request, websocket, upstream).run().await;
}

/// Wait for the first data message and parse it as a tunnel request.
///
/// Returns `None` when the client goes away first.
async fn read_handshake<S>(websocket: &mut S) -> Option<Result<TunnelRequest, HandshakeError>>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(Ok(message)) = websocket.next().await {
        match message {
            Message::Text(text) => return Some(TunnelRequest::from_text(&text)),
            Message::Binary(data) => return Some(TunnelRequest::from_bytes(data)),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Send a close frame, then give the client a chance to answer it.
async fn close_gracefully<S>(mut websocket: WebSocketStream<S>, frame: CloseFrame<'static>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = websocket.close(Some(frame)).await {
        debug!("WebSocket close failed: {}", e);
        return;
    }

    let drain = async { while let Some(Ok(_)) = websocket.next().await {} };
    if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
        debug!("Client did not complete the closing handshake");
    }
}

/// One client-to-target relay.
///
/// Owns both transports for its whole life; both are closed when
/// [`Session::run`] returns.
pub struct Session {
    request: TunnelRequest,
    websocket: WebSocketStream<TcpStream>,
    upstream: TcpStream,
}

impl Session {
    pub fn new(
        request: TunnelRequest,
        websocket: WebSocketStream<TcpStream>,
        upstream: TcpStream,
    ) -> Self {
        Self {
            request,
            websocket,
            upstream,
        }
    }

    /// Relay in both directions until either one ends, then tear down.
    pub async fn run(self) {
        let (mut ws_sink, mut ws_source) = self.websocket.split();
        let (mut tcp_reader, mut tcp_writer) = self.upstream.into_split();
        let cancel = CancellationToken::new();

        // Each task owns its halves and hands the WebSocket half back
        let mut to_tcp = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let result =
                    forward::websocket_to_tcp(&mut ws_source, &mut tcp_writer, &cancel).await;
                (ws_source, result)
            }
        });

        let mut to_ws = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let result =
                    forward::tcp_to_websocket(&mut tcp_reader, &mut ws_sink, &cancel).await;
                (ws_sink, result)
            }
        });

        let (to_tcp_done, to_ws_done) = tokio::select! {
            done = &mut to_tcp => {
                cancel.cancel();
                (done, to_ws.await)
            }
            done = &mut to_ws => {
                cancel.cancel();
                (to_tcp.await, done)
            }
        };

        let source = finish_direction("client -> target", to_tcp_done);
        let sink = finish_direction("target -> client", to_ws_done);

        // Both TCP halves are gone once the tasks have ended
        if let (Some(source), Some(sink)) = (source, sink) {
            if let Ok(websocket) = source.reunite(sink) {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                close_gracefully(websocket, frame).await;
            }
        }

        info!("Tunnel closed for {}:{}", self.request.host, self.request.port);
    }
}

fn finish_direction<T>(
    direction: &str,
    joined: Result<(T, Result<u64, ForwardError>), JoinError>,
) -> Option<T> {
    match joined {
        Ok((half, Ok(bytes))) => {
            debug!("{} finished after {} bytes", direction, bytes);
            Some(half)
        }
        Ok((half, Err(e))) => {
            debug!("{} stopped: {}", direction, e);
            Some(half)
        }
        Err(e) => {
            debug!("{} task failed: {}", direction, e);
            None
        }
    }
}

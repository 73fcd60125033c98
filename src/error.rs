use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Why a handshake payload could not be turned into a tunnel request.
///
/// All variants are reported to the client identically; the distinction
/// only shows up in the warning log.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("host must not be empty")]
    EmptyHost,
}

/// Why a forwarding direction stopped before a clean end-of-stream.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("TCP error: {0}")]
    Tcp(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

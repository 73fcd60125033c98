use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};

/// Terminal outcomes that end a session before any data is relayed.
///
/// The close code and reason are the only signal the client ever gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Upgrade request was for a path other than the tunnel endpoint
    UnsupportedPath,
    /// First message was not a usable tunnel request
    InvalidHandshake,
    /// The requested TCP endpoint could not be reached
    UpstreamFailed,
}

impl Rejection {
    pub fn code(&self) -> CloseCode {
        match self {
            Rejection::UnsupportedPath | Rejection::InvalidHandshake => CloseCode::Policy,
            Rejection::UpstreamFailed => CloseCode::Error,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::UnsupportedPath => "Unsupported path",
            Rejection::InvalidHandshake => "Invalid handshake",
            Rejection::UpstreamFailed => "Upstream connection failed",
        }
    }

    pub fn close_frame(&self) -> CloseFrame<'static> {
        CloseFrame {
            code: self.code(),
            reason: self.reason().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(u16::from(Rejection::UnsupportedPath.code()), 1008);
        assert_eq!(u16::from(Rejection::InvalidHandshake.code()), 1008);
        assert_eq!(u16::from(Rejection::UpstreamFailed.code()), 1011);
    }

    #[test]
    fn test_close_frame() {
        let frame = Rejection::InvalidHandshake.close_frame();
        assert_eq!(frame.code, CloseCode::Policy);
        assert_eq!(frame.reason, "Invalid handshake");
    }
}

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::error::HandshakeError;

/// The first message of a session: which TCP endpoint to relay to.
///
/// `port` is kept as a wide integer on purpose. Anything that parses as an
/// integer is a well-formed request; whether it names a usable port is
/// decided when dialing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TunnelRequest {
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: i64,
}

impl TunnelRequest {
    /// Parse a text handshake
    pub fn from_text(text: &str) -> Result<Self, HandshakeError> {
        let request: TunnelRequest = serde_json::from_str(text)?;
        if request.host.is_empty() {
            return Err(HandshakeError::EmptyHost);
        }
        Ok(request)
    }

    /// Parse a binary handshake, which must carry UTF-8 JSON
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, HandshakeError> {
        let text = String::from_utf8(data)?;
        Self::from_text(&text)
    }
}

impl fmt::Display for TunnelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Coerces the `port` field the way an integer conversion would:
/// integers as-is, floats truncated, numeric strings parsed and booleans
/// as 0 or 1.
struct PortVisitor;

impl<'de> Visitor<'de> for PortVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer, a numeric string or a boolean")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<i64, E> {
        Ok(i64::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
        Ok(value)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
        // Past i64 it is out of range either way; the dial rejects it
        Ok(i64::try_from(value).unwrap_or(i64::MAX))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
        if !value.is_finite() {
            return Err(E::custom(format!("port is not a finite number: {}", value)));
        }
        Ok(value.trunc() as i64)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| E::custom(format!("port {:?} is not an integer: {}", value, e)))
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(PortVisitor)
}

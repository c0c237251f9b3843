//! Socket.IO v5 packets carried in Engine.IO v4 text frames.
//!
//! Only the default namespace is used. A frame is an Engine.IO type digit,
//! and for `4` (message) a Socket.IO type digit plus JSON.

use serde_json::Value;

use super::LiveError;

/// One decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake, `0{"sid":…,"pingInterval":…}`
    Open(Value),
    /// Engine.IO close, `1`
    Close,
    /// Engine.IO ping, `2` with an optional payload
    Ping(String),
    /// Engine.IO pong, `3`
    Pong(String),
    /// Socket.IO namespace connect, `40`
    Connect(Option<Value>),
    /// Socket.IO namespace disconnect, `41`
    Disconnect,
    /// Socket.IO event, `42["name", payload]`
    Event { name: String, payload: Value },
    /// Socket.IO connect refused, `44{"message":…}`
    ConnectError(Value),
    /// Engine.IO noop, `6`
    Noop,
}

impl Packet {
    pub fn event(name: impl Into<String>, payload: impl Into<Value>) -> Self {
        Packet::Event {
            name: name.into(),
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(value) => format!("0{}", value),
            Packet::Close => "1".to_string(),
            Packet::Ping(data) => format!("2{}", data),
            Packet::Pong(data) => format!("3{}", data),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(value)) => format!("40{}", value),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, payload } => {
                format!("42{}", Value::Array(vec![Value::String(name.clone()), payload.clone()]))
            }
            Packet::ConnectError(value) => format!("44{}", value),
            Packet::Noop => "6".to_string(),
        }
    }

    pub fn decode(frame: &str) -> Result<Self, LiveError> {
        let mut chars = frame.chars();
        let engine_type = chars
            .next()
            .ok_or_else(|| LiveError::Protocol("empty frame".to_string()))?;
        let rest = chars.as_str();

        match engine_type {
            '0' => Ok(Packet::Open(parse_json(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(rest.to_string())),
            '3' => Ok(Packet::Pong(rest.to_string())),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(LiveError::Protocol(format!("unsupported frame type {}", other))),
        }
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, LiveError> {
    let mut chars = body.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| LiveError::Protocol("empty socket packet".to_string()))?;
    let rest = chars.as_str();

    if rest.starts_with('/') {
        return Err(LiveError::Protocol(format!("unexpected namespace in {}", body)));
    }

    match socket_type {
        '0' if rest.is_empty() => Ok(Packet::Connect(None)),
        '0' => Ok(Packet::Connect(Some(parse_json(rest)?))),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // Ack ids precede the array; the client never requests acks so they are skipped.
            let json = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let Value::Array(mut items) = parse_json(json)? else {
                return Err(LiveError::Protocol(format!("event is not an array: {}", json)));
            };
            if items.is_empty() {
                return Err(LiveError::Protocol("event without a name".to_string()));
            }
            let Value::String(name) = items.remove(0) else {
                return Err(LiveError::Protocol("event name is not a string".to_string()));
            };
            let payload = if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            };
            Ok(Packet::Event { name, payload })
        }
        '4' => Ok(Packet::ConnectError(parse_json(rest).unwrap_or(Value::Null))),
        other => Err(LiveError::Protocol(format!("unsupported socket packet type {}", other))),
    }
}

fn parse_json(text: &str) -> Result<Value, LiveError> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| LiveError::Protocol(format!("bad JSON payload: {}", e)))
}

/// WebSocket endpoint for a server base URL
pub fn engine_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/socket.io/?EIO=4&transport=websocket", base)
}

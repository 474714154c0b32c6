use serde_json::Value;

/// Minimal engine.io v4 / socket.io framing over a websocket transport.
///
/// Only the packets the relay actually exchanges are modeled: the engine
/// handshake, engine ping/pong, the default-namespace connect, and event
/// packets on the `message` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0{...}` engine.io handshake from the server.
    Open(Value),
    /// `1` engine.io close.
    Close,
    /// `2` engine.io ping; must be answered with `Pong`.
    Ping,
    /// `3` engine.io pong.
    Pong,
    /// `40...` namespace connect (request or ack).
    Connect(Value),
    /// `44...` namespace connect refusal.
    ConnectError(Value),
    /// `42["<event>", <payload>]`.
    Event { event: String, payload: Value },
    /// Anything this client does not speak.
    Other(String),
}

#[derive(Debug, thiserror::Error)]
#[error("bad frame: {0}")]
pub struct FrameError(String);

pub fn parse_frame(text: &str) -> Result<Frame, FrameError> {
    let mut chars = text.chars();
    let engine = chars
        .next()
        .ok_or_else(|| FrameError("empty frame".to_string()))?;
    let rest = chars.as_str();

    match engine {
        '0' => Ok(Frame::Open(parse_json_or_null(rest))),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => parse_socket_packet(rest),
        _ => Ok(Frame::Other(text.to_string())),
    }
}

fn parse_socket_packet(rest: &str) -> Result<Frame, FrameError> {
    let mut chars = rest.chars();
    let packet = chars
        .next()
        .ok_or_else(|| FrameError("bare engine message".to_string()))?;
    let body = chars.as_str();

    match packet {
        '0' => Ok(Frame::Connect(parse_json_or_null(body))),
        '1' => Ok(Frame::Close),
        '2' => parse_event(body),
        '4' => Ok(Frame::ConnectError(parse_json_or_null(body))),
        _ => Ok(Frame::Other(format!("4{}", rest))),
    }
}

fn parse_event(body: &str) -> Result<Frame, FrameError> {
    // An ack id may precede the array: `42<digits>[...]`.
    let array_start = body
        .find('[')
        .ok_or_else(|| FrameError(format!("event without array: {}", body)))?;
    let array: Vec<Value> = serde_json::from_str(&body[array_start..])
        .map_err(|e| FrameError(format!("event payload: {}", e)))?;

    let mut items = array.into_iter();
    let event = items
        .next()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| FrameError("event without name".to_string()))?;
    let payload = items.next().unwrap_or(Value::Null);

    Ok(Frame::Event { event, payload })
}

fn parse_json_or_null(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(raw).unwrap_or(Value::Null)
    }
}

/// Encodes the default-namespace connect request.
pub fn connect_frame() -> String {
    "40".to_string()
}

/// Encodes the engine.io pong answering a server ping.
pub fn pong_frame() -> String {
    "3".to_string()
}

/// Encodes `42["<event>", <payload>]`.
pub fn event_frame(event: &str, payload: &Value) -> String {
    // (event, payload) serializes as a two-element JSON array.
    let body = serde_json::to_string(&(event, payload)).unwrap_or_else(|_| "[]".to_string());
    format!("42{}", body)
}

/// Rewrites the configured server URL into the websocket connect URL with
/// the auth key in the query string.
pub fn build_ws_url(server_url: &str, path: &str, extra_push_auth_key: &str) -> String {
    let base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        server_url.to_string()
    };

    let base = base.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let mut url = format!("{}{}", base, path);
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str("?EIO=4&transport=websocket");
    if !extra_push_auth_key.is_empty() {
        url.push_str("&extraPushAuthKey=");
        url.push_str(&urlencode(extra_push_auth_key));
    }
    url
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

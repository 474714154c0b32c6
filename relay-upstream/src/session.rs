use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing;

use relay_core::config::SocketConfig;
use relay_core::types::Envelope;
use relay_core::{RelayError, Result};

use crate::envelope::{route, Route, SocketData};
use crate::transport::{build_ws_url, connect_frame, event_frame, parse_frame, pong_frame, Frame};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const ENVELOPE_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle notifications surfaced next to the envelope stream.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Error(String),
}

/// Receiving ends handed to the relay: one stream of typed envelopes, one of
/// lifecycle events.
pub struct SessionChannels {
    pub envelopes: mpsc::Receiver<Envelope>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Long-lived client session against the chat node.
///
/// Owns its socket exclusively, reconnects with exponential backoff, sends
/// the application heartbeat on a fixed cadence, and hides all of that
/// behind the channels returned from `start`. There is no replay: envelopes
/// lost while disconnected are gone, the relay's PIN dedup covers redelivery
/// after reconnect.
pub struct Session {
    config: SocketConfig,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(config: SocketConfig) -> Self {
        Session {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Shared connectivity flag, e.g. for the management /stats surface.
    pub fn connected_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Stops the session permanently; the channels close once the loop
    /// winds down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Spawns the connect/read/heartbeat loop and returns its channels.
    pub fn start(&self) -> SessionChannels {
        let (envelope_tx, envelope_rx) = mpsc::channel(ENVELOPE_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let config = self.config.clone();
        let connected = Arc::clone(&self.connected);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            run_loop(config, connected, cancel, envelope_tx, event_tx).await;
        });

        SessionChannels {
            envelopes: envelope_rx,
            events: event_rx,
        }
    }
}

async fn run_loop(
    config: SocketConfig,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    envelope_tx: mpsc::Sender<Envelope>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let url = build_ws_url(
        &config.server_url,
        &config.path,
        &config.extra_push_auth_key,
    );
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match run_connection(
            &config,
            &url,
            &connected,
            &cancel,
            &envelope_tx,
            &event_tx,
            &mut backoff,
        )
        .await
        {
            Ok(()) => {
                tracing::info!("upstream session disconnected");
            }
            Err(e) => {
                tracing::warn!("upstream session error: {}", e);
                let _ = event_tx.send(SessionEvent::Error(e.to_string())).await;
            }
        }

        if connected.swap(false, Ordering::SeqCst) {
            let _ = event_tx.send(SessionEvent::Disconnected).await;
        }

        if cancel.is_cancelled() {
            break;
        }

        tracing::info!("reconnecting to chat node in {:?}", backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => break,
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    tracing::info!("upstream session stopped");
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    config: &SocketConfig,
    url: &str,
    connected: &Arc<AtomicBool>,
    cancel: &CancellationToken,
    envelope_tx: &mpsc::Sender<Envelope>,
    event_tx: &mpsc::Sender<SessionEvent>,
    backoff: &mut Duration,
) -> Result<()> {
    let connect_timeout = Duration::from_secs(config.timeout_secs.max(1));

    let (ws, _response) =
        tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| RelayError::Timeout)?
            .map_err(|e| RelayError::NotConnected(format!("connect {}: {}", config.server_url, e)))?;

    let (mut sink, mut stream) = ws.split();

    // engine.io open, then the default-namespace connect exchange.
    tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        wait_for_frame(&mut stream, |f| matches!(f, Frame::Open(_))).await?;
        sink.send(Message::Text(connect_frame()))
            .await
            .map_err(|e| RelayError::NotConnected(format!("handshake send: {}", e)))?;
        wait_for_frame(&mut stream, |f| {
            matches!(f, Frame::Connect(_) | Frame::ConnectError(_))
        })
        .await
        .and_then(|f| match f {
            Frame::ConnectError(detail) => Err(RelayError::NotConnected(format!(
                "connect refused: {}",
                detail
            ))),
            _ => Ok(()),
        })
    })
    .await
    .map_err(|_| RelayError::Timeout)??;

    connected.store(true, Ordering::SeqCst);
    *backoff = INITIAL_BACKOFF;
    tracing::info!("connected to chat node at {}", config.server_url);
    let _ = event_tx.send(SessionEvent::Connected).await;

    // The writer owns the sink; the reader and the heartbeat push frames
    // through this channel.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    let mut writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                tracing::warn!("upstream send failed, treating connection as dead: {}", e);
                break;
            }
        }
    });

    let heartbeat_tx = out_tx.clone();
    let mut heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let payload = match serde_json::to_value(SocketData::heartbeat()) {
                Ok(payload) => payload,
                Err(_) => break,
            };
            if heartbeat_tx
                .send(event_frame("message", &payload))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = &mut writer => {
                break Err(RelayError::NotConnected("writer closed".to_string()));
            }
            _ = &mut heartbeat => {
                break Err(RelayError::NotConnected("heartbeat stopped".to_string()));
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_text_frame(&text, &out_tx, envelope_tx).await;
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break Err(RelayError::NotConnected(format!("read: {}", e)));
                }
            }
        }
    };

    writer.abort();
    heartbeat.abort();
    result
}

async fn wait_for_frame<S>(
    stream: &mut S,
    want: impl Fn(&Frame) -> bool,
) -> Result<Frame>
where
    S: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(message) = stream.next().await {
        let message =
            message.map_err(|e| RelayError::NotConnected(format!("handshake read: {}", e)))?;
        if let Message::Text(text) = message {
            match parse_frame(&text) {
                Ok(frame) if want(&frame) => return Ok(frame),
                Ok(_) => {}
                Err(e) => tracing::debug!("skipping frame during handshake: {}", e),
            }
        }
    }
    Err(RelayError::NotConnected(
        "connection closed during handshake".to_string(),
    ))
}

/// Decodes one inbound text frame. Anything malformed is logged and
/// dropped so a single bad frame can never take the session down.
async fn handle_text_frame(
    text: &str,
    out_tx: &mpsc::Sender<String>,
    envelope_tx: &mpsc::Sender<Envelope>,
) {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("unparseable upstream frame: {}", e);
            return;
        }
    };

    match frame {
        Frame::Ping => {
            let _ = out_tx.send(pong_frame()).await;
        }
        Frame::Event { event, payload } if event == "message" => {
            let socket_data = match decode_socket_data(payload) {
                Some(data) => data,
                None => return,
            };
            match route(socket_data) {
                Route::Heartbeat => {
                    // Acknowledged implicitly; nothing goes back upstream.
                    tracing::debug!("server heartbeat received");
                }
                Route::Envelope(envelope) => {
                    tracing::debug!("received {} envelope", envelope.kind);
                    if envelope_tx.send(envelope).await.is_err() {
                        tracing::warn!("envelope channel closed, dropping frame");
                    }
                }
                Route::Unknown(method) => {
                    tracing::debug!("ignoring unknown upstream method: {}", method);
                }
            }
        }
        Frame::Event { event, .. } => {
            tracing::debug!("ignoring upstream event: {}", event);
        }
        Frame::Pong | Frame::Open(_) | Frame::Connect(_) => {}
        Frame::Close | Frame::ConnectError(_) => {
            tracing::debug!("upstream signalled close");
        }
        Frame::Other(raw) => {
            tracing::debug!("ignoring frame: {}", raw);
        }
    }
}

/// The payload is usually the `{M, C, D}` object; some servers double-encode
/// it as a JSON string.
fn decode_socket_data(payload: Value) -> Option<SocketData> {
    let value = match payload {
        Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("unparseable message payload: {}", e);
                return None;
            }
        },
        other => other,
    };

    match serde_json::from_value::<SocketData>(value) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::warn!("message payload is not {{M,C,D}}: {}", e);
            None
        }
    }
}

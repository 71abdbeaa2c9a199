use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{
    Envelope, InboundResponse, IpcError, IpcHandler, MESSAGE_ACTIVE, MESSAGE_HEARTBEAT,
    MESSAGE_RESPONSE, SessionIdentity, callback_envelope,
};
use crate::config::BridgeConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Persistent duplex connection to the speech engine.
///
/// [`IpcClient::run`] owns the connection: it retries forever while the
/// engine is down, announces this session on every connect, sends
/// heartbeats, and answers each inbound `response` on its own task so a
/// slow command never blocks the reader.
pub struct IpcClient {
    url: String,
    identity: SessionIdentity,
    reconnect_interval: Duration,
    heartbeat_interval: Duration,
    handler: Arc<IpcHandler>,
    writer: Mutex<Option<WsWriter>>,
}

impl IpcClient {
    pub fn new(config: &BridgeConfig, identity: SessionIdentity, handler: Arc<IpcHandler>) -> Self {
        Self {
            url: format!("ws://localhost:{}/", config.websocket_port),
            identity,
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            handler,
            writer: Mutex::new(None),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Sends one frame. Fails fast when disconnected; nothing is queued.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), IpcError> {
        let serialized =
            serde_json::to_string(envelope).map_err(|err| IpcError::Serialize(err.to_string()))?;

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(IpcError::NotConnected);
        };

        match sink.send(Message::Text(serialized.into())).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // the reader notices the broken stream and reconnects
                *writer = None;
                Err(IpcError::WebSocketSend(err.to_string()))
            }
        }
    }

    /// Connection loop. Never returns; abort the task to stop it.
    pub async fn run(self: Arc<Self>) {
        loop {
            let stream = self.connect_with_retry().await;
            let (writer, reader) = stream.split();
            *self.writer.lock().await = Some(writer);
            info!(url = %self.url, "connected to speech engine");

            if let Err(err) = self.send(&self.identity_envelope(MESSAGE_ACTIVE)).await {
                warn!("failed to announce session: {err}");
            }

            let reason = self.read_until_closed(reader).await;
            self.close_writer().await;
            warn!(reason, "speech engine connection lost; reconnecting");
            tokio::time::sleep(self.reconnect_interval).await;
        }
    }

    async fn connect_with_retry(&self) -> WsStream {
        let mut attempt = 0_u64;
        loop {
            attempt += 1;
            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => return stream,
                Err(err) => {
                    // the engine is routinely not running yet, so only the
                    // first failure is worth a warning
                    if attempt == 1 {
                        warn!(url = %self.url, "speech engine unreachable: {err}");
                    } else {
                        debug!(attempt, "connection attempt failed: {err}");
                    }
                    tokio::time::sleep(self.reconnect_interval).await;
                }
            }
        }
    }

    async fn read_until_closed(self: &Arc<Self>, mut reader: WsReader) -> String {
        let start = tokio::time::Instant::now() + self.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(start, self.heartbeat_interval);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(err) = self.send(&self.identity_envelope(MESSAGE_HEARTBEAT)).await {
                        warn!("failed to send heartbeat: {err}");
                    }
                }
                message = reader.next() => match message {
                    Some(Ok(Message::Text(text))) => self.on_text(text.to_string()),
                    Some(Ok(Message::Binary(_))) => {
                        debug!("ignored websocket binary payload");
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .as_ref()
                            .map(|close| close.reason.to_string())
                            .unwrap_or_default();
                        return if reason.trim().is_empty() {
                            "remote closed".to_string()
                        } else {
                            reason
                        };
                    }
                    Some(Err(err)) => return format!("websocket receive error: {err}"),
                    None => return "websocket stream ended".to_string(),
                },
            }
        }
    }

    fn on_text(self: &Arc<Self>, text: String) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.handle_text(&text).await;
        });
    }

    async fn handle_text(&self, text: &str) {
        let envelope = match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("dropping malformed ipc message: {err}");
                self.record_dropped().await;
                return;
            }
        };

        if envelope.message != MESSAGE_RESPONSE {
            debug!(message = %envelope.message, "ignoring ipc message");
            return;
        }

        let inbound = match serde_json::from_value::<InboundResponse>(envelope.data) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!("dropping malformed response payload: {err}");
                self.record_dropped().await;
                return;
            }
        };

        let response = self.handler.handle(inbound.response).await;
        let Some(callback) = inbound.callback else {
            return;
        };
        if let Err(err) = self.send(&callback_envelope(callback, response)).await {
            warn!("failed to send callback: {err}");
            self.handler
                .runtime()
                .metrics
                .lock()
                .await
                .record_failed_send();
        }
    }

    async fn record_dropped(&self) {
        self.handler
            .runtime()
            .metrics
            .lock()
            .await
            .record_dropped_message();
    }

    async fn close_writer(&self) {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        match writer.send(Message::Close(None)).await {
            Ok(()) => {}
            Err(err) if is_expected_close_error(&err) => {}
            Err(err) => debug!("failed to close websocket: {err}"),
        }
    }

    fn identity_envelope(&self, message: &str) -> Envelope {
        Envelope::new(message, self.identity.to_value())
    }
}

fn is_expected_close_error(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::AlreadyClosed | tungstenite::Error::ConnectionClosed
    ) || err
        .to_string()
        .contains("Sending after closing is not allowed")
}

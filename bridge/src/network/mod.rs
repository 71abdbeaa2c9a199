//! IPC with the speech engine.
//!
//! Two transports carry the same messages: a duplex WebSocket to a fixed
//! local port ([`IpcClient`]) and the legacy pair of local HTTP endpoints
//! ([`bind_server`] / [`HttpClient`]).

mod http;
mod ws_client;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use http::{HttpClient, bind_server, router, serve};
pub use ws_client::IpcClient;

use crate::commands::{Command, CommandHandler, Response};
use crate::state::{RuntimeState, StateManager};

pub const MESSAGE_ACTIVE: &str = "active";
pub const MESSAGE_HEARTBEAT: &str = "heartbeat";
pub const MESSAGE_CALLBACK: &str = "callback";
pub const MESSAGE_RESPONSE: &str = "response";

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("failed to connect websocket: {0}")]
    ConnectFailed(String),
    #[error("websocket is not connected")]
    NotConnected,
    #[error("failed to serialize ipc payload: {0}")]
    Serialize(String),
    #[error("failed to send websocket payload: {0}")]
    WebSocketSend(String),
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },
    #[error("http server failed: {0}")]
    Serve(String),
    #[error("http request failed: {0}")]
    Http(String),
}

/// `{message, data}` frame used in both directions on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundResponse {
    #[serde(default)]
    pub callback: Option<Value>,
    #[serde(default)]
    pub response: ResponsePayload,
}

/// What the speech engine decided to do with an utterance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub alternatives: Option<Value>,
    #[serde(default)]
    pub execute: Option<ExecutePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutePayload {
    #[serde(default)]
    pub sequences: Vec<CommandSequence>,
}

/// One interpretation of an utterance, run front to back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandSequence {
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// Identifies this process to the speech engine for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub app: String,
    pub id: String,
}

impl SessionIdentity {
    pub fn new(app: &str) -> Self {
        Self {
            app: app.to_string(),
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "app": self.app, "id": self.id })
    }
}

/// Applies a [`ResponsePayload`] to state and the command dispatcher.
pub struct IpcHandler {
    runtime: Arc<RuntimeState>,
    commands: Arc<CommandHandler>,
}

impl IpcHandler {
    pub fn new(runtime: Arc<RuntimeState>, commands: Arc<CommandHandler>) -> Self {
        Self { runtime, commands }
    }

    pub fn runtime(&self) -> &Arc<RuntimeState> {
        &self.runtime
    }

    /// Runs every command of every sequence in order and returns the reply
    /// of the last one.
    pub async fn handle(&self, payload: ResponsePayload) -> Option<Response> {
        let state = &self.runtime.state;
        if let Some(alternatives) = payload.alternatives {
            state.set("alternatives", json!({ "alternatives": alternatives }));
        }

        let execute = payload.execute?;
        state.set("volume", 0);

        let mut result = None;
        for sequence in &execute.sequences {
            for command in &sequence.commands {
                debug!(command_type = %command.command_type, "dispatching command");
                result = self.commands.dispatch(command).await;
            }
        }
        result
    }
}

#[derive(Clone)]
enum Channel {
    WebSocket(Arc<IpcClient>),
    Http(HttpClient),
}

/// Fire-and-forget sender for messages to the speech engine.
#[derive(Clone)]
pub struct Outbound {
    channel: Channel,
    runtime: Arc<RuntimeState>,
}

impl Outbound {
    pub fn websocket(client: Arc<IpcClient>, runtime: Arc<RuntimeState>) -> Self {
        Self {
            channel: Channel::WebSocket(client),
            runtime,
        }
    }

    pub fn http(client: HttpClient, runtime: Arc<RuntimeState>) -> Self {
        Self {
            channel: Channel::Http(client),
            runtime,
        }
    }

    /// Sends `message` and reports whether it was delivered. Failures are
    /// logged and counted, never retried.
    pub async fn send(&self, message: &str, data: Value) -> bool {
        let result = match &self.channel {
            Channel::WebSocket(client) => client.send(&Envelope::new(message, data)).await,
            Channel::Http(client) => client.send(message, data).await,
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(message, "failed to send ipc message: {err}");
                self.runtime.metrics.lock().await.record_failed_send();
                false
            }
        }
    }

    pub async fn send_active(&self) -> bool {
        self.send(MESSAGE_ACTIVE, self.runtime.identity.to_value())
            .await
    }

    pub fn spawn_send(&self, message: &'static str, data: Value) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(message, "no async runtime; dropping ipc message");
            return;
        };
        let outbound = self.clone();
        handle.spawn(async move {
            outbound.send(message, data).await;
        });
    }
}

/// Tells the speech engine to stop or resume listening whenever the
/// `listening` state key changes.
pub fn forward_listening(state: &StateManager, outbound: Outbound) {
    state.subscribe("listening", move |listening, _| {
        let message = if listening.as_bool().unwrap_or(false) {
            "DISABLE_LISTENING"
        } else {
            "ENABLE_LISTENING"
        };
        outbound.spawn_send(message, json!({}));
    });
}

pub fn callback_envelope(callback: Value, response: Option<Response>) -> Envelope {
    Envelope::new(
        MESSAGE_CALLBACK,
        json!({ "callback": callback, "data": response }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{GET_EDITOR_STATE, OPEN_FILE_LIST, PAUSE};
    use crate::config::BridgeConfig;
    use crate::editor::memory::{MemoryEditor, MemoryWorkbench};
    use crate::editor::{ActiveEditor, Workbench};
    use crate::state::AppState;

    pub(crate) fn ipc_handler(text: &str) -> Arc<IpcHandler> {
        let config = BridgeConfig {
            animations: false,
            ui_delay_ms: 0,
            ..BridgeConfig::default()
        };
        let runtime = AppState::new(config).runtime();
        let workbench = Arc::new(MemoryWorkbench::new());
        let editor = workbench.open_tab(MemoryEditor::new(text).with_path("/work/app.js", "javascript"));
        let commands = CommandHandler::new(
            Arc::clone(&runtime),
            workbench as Arc<dyn Workbench>,
            ActiveEditor::fixed(editor),
        )
        .expect("registry is complete");
        Arc::new(IpcHandler::new(runtime, Arc::new(commands)))
    }

    #[test]
    fn inbound_response_parses_nested_commands() {
        let raw = json!({
            "callback": "abc",
            "response": {
                "alternatives": [{"description": "delete line"}],
                "execute": {
                    "sequences": [
                        {"commands": [{"type": "COMMAND_TYPE_DIFF", "source": "x", "cursor": 1}]},
                        {"commands": []}
                    ]
                }
            }
        });

        let inbound: InboundResponse = serde_json::from_value(raw).expect("inbound response");
        assert_eq!(inbound.callback, Some(json!("abc")));
        let execute = inbound.response.execute.expect("execute");
        assert_eq!(execute.sequences.len(), 2);
        assert_eq!(execute.sequences[0].commands[0].command_type, "COMMAND_TYPE_DIFF");
    }

    #[test]
    fn identity_is_stable_and_unique() {
        let first = SessionIdentity::new("vscode");
        let second = SessionIdentity::new("vscode");
        assert_ne!(first.id, second.id);
        assert_eq!(first.to_value()["app"], json!("vscode"));
        assert_eq!(first.to_value()["id"], json!(first.id));
    }

    fn sequence(commands: Value) -> ResponsePayload {
        serde_json::from_value(json!({
            "execute": {"sequences": [{"commands": commands}]}
        }))
        .expect("payload")
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_last_reply_of_a_sequence_is_returned() {
        let handler = ipc_handler("source");

        let response = handler
            .handle(sequence(json!([
                {"type": OPEN_FILE_LIST, "path": "app"},
                {"type": GET_EDITOR_STATE}
            ])))
            .await
            .expect("editor state reply");
        assert_eq!(response.message, "editorState");
        assert_eq!(response.data["source"], json!("source"));

        let response = handler
            .handle(sequence(json!([
                {"type": GET_EDITOR_STATE},
                {"type": OPEN_FILE_LIST, "path": "app"}
            ])))
            .await
            .expect("file list reply");
        assert_eq!(
            response,
            Response::new("sendText", json!({"text": "callback open"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_unknown_command_yields_no_reply() {
        let handler = ipc_handler("source");
        let payload: ResponsePayload = serde_json::from_value(json!({
            "execute": {"sequences": [
                {"commands": [{"type": "COMMAND_TYPE_GET_EDITOR_STATE"}]},
                {"commands": [
                    {"type": "COMMAND_TYPE_OPEN_FILE_LIST", "path": "nothing"},
                    {"type": "COMMAND_TYPE_FOO"}
                ]}
            ]}
        }))
        .expect("payload");

        assert_eq!(handler.handle(payload).await, None);
        assert_eq!(handler.runtime().state.get("volume"), Some(json!(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn alternatives_are_published_to_state() {
        let handler = ipc_handler("");
        let payload: ResponsePayload = serde_json::from_value(json!({
            "alternatives": [{"description": "save"}]
        }))
        .expect("payload");

        assert_eq!(handler.handle(payload).await, None);
        let state = &handler.runtime().state;
        assert_eq!(
            state.get("alternatives"),
            Some(json!({"alternatives": [{"description": "save"}]}))
        );
        assert_eq!(state.get("volume"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_publishes_volume_twice() {
        let handler = ipc_handler("");
        let state = &handler.runtime().state;
        let volumes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&volumes);
        state.subscribe("volume", move |value, previous| {
            sink.lock()
                .expect("volumes lock")
                .push((value.clone(), previous.cloned()));
        });
        state.set("volume", 50);

        let payload: ResponsePayload = serde_json::from_value(json!({
            "execute": {"sequences": [{"commands": [{"type": PAUSE}]}]}
        }))
        .expect("payload");
        handler.handle(payload).await;

        let volumes = volumes.lock().expect("volumes lock");
        assert_eq!(volumes[0], (json!(50), None));
        assert_eq!(volumes[1], (json!(0), Some(json!(50))));
        assert_eq!(state.get("listening"), Some(json!(false)));
    }

    #[test]
    fn callback_envelope_echoes_id() {
        let envelope = callback_envelope(
            json!(7),
            Some(Response::new("sendText", json!({"text": "callback open"}))),
        );
        assert_eq!(envelope.message, "callback");
        assert_eq!(envelope.data["callback"], json!(7));
        assert_eq!(envelope.data["data"]["message"], json!("sendText"));

        let empty = callback_envelope(json!("x"), None);
        assert_eq!(empty.data["data"], Value::Null);
    }
}

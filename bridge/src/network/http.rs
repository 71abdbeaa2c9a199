//! Legacy transport: the engine POSTs responses to a local server and this
//! bridge POSTs its own messages back to the engine's port.

use std::io::ErrorKind;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::{IpcError, IpcHandler, ResponsePayload};
use crate::error::AppError;

pub fn router(handler: Arc<IpcHandler>) -> Router {
    Router::new()
        .route("/", post(response_handler))
        .with_state(handler)
}

async fn response_handler(
    State(handler): State<Arc<IpcHandler>>,
    body: Bytes,
) -> impl IntoResponse {
    let payload = match serde_json::from_slice::<ResponsePayload>(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("rejecting malformed request body: {err}");
            handler
                .runtime()
                .metrics
                .lock()
                .await
                .record_dropped_message();
            return (StatusCode::BAD_REQUEST, Json(json!({ "success": false }))).into_response();
        }
    };

    match handler.handle(payload).await {
        Some(response) => Json(response).into_response(),
        None => Json(json!({ "success": true })).into_response(),
    }
}

/// Binds the inbound port on the loopback interface.
///
/// A port that is already taken means another editor window owns the
/// bridge, which is reported as [`AppError::AlreadyRunning`].
pub async fn bind_server(port: u16) -> Result<TcpListener, AppError> {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            error!(port, "voice commands are already handled by another editor window");
            Err(AppError::AlreadyRunning(port))
        }
        Err(source) => Err(IpcError::Bind { port, source }.into()),
    }
}

pub async fn serve(listener: TcpListener, handler: Arc<IpcHandler>) -> Result<(), IpcError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http ipc server listening");
    }
    axum::serve(listener, router(handler))
        .await
        .map_err(|err| IpcError::Serve(err.to_string()))
}

/// Posts `{type, ...data}` bodies to the engine's local endpoint.
#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    url: String,
}

impl HttpClient {
    pub fn new(port: u16) -> Self {
        Self::with_url(format!("http://localhost:{port}/"))
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    pub async fn send(&self, message: &str, data: Value) -> Result<(), IpcError> {
        let mut body = match data {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        body.insert("type".to_string(), Value::String(message.to_string()));

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| IpcError::Http(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(IpcError::Http(format!("unexpected status {status}: {text}")))
        }
    }
}

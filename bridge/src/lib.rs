pub mod commands;
pub mod config;
pub mod diff;
pub mod editor;
mod error;
pub mod highlight;
pub mod metrics;
pub mod network;
pub mod runner;
pub mod state;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub use error::AppError;

use commands::CommandHandler;
use config::{BridgeConfig, Transport};
use editor::{ActiveEditor, Workbench};
use network::{
    HttpClient, IpcClient, IpcHandler, MESSAGE_ACTIVE, Outbound, bind_server, forward_listening,
    serve,
};
use runner::{Platform, client_url, is_port_available, runner_profile};
use state::{AppState, RuntimeState};

pub fn init_logging() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}

/// Runs the bridge against `workbench` until Ctrl-C.
pub async fn run(config: BridgeConfig, workbench: Arc<dyn Workbench>) -> Result<(), AppError> {
    let app_state = AppState::new(config);
    let runtime = app_state.runtime();
    let config = &runtime.config;
    info!(
        app = %config.app,
        session_id = %runtime.identity.id,
        transport = ?config.transport,
        error_color = %config.error_rgb(),
        success_color = %config.success_rgb(),
        "starting voicebridge"
    );

    if !config.disable_autostart {
        check_engine(config.websocket_port).await;
    }

    let active = ActiveEditor::new();
    let commands = CommandHandler::new(Arc::clone(&runtime), Arc::clone(&workbench), active.clone())
        .map_err(|err| AppError::Runtime(err.to_string()))?;
    let handler = Arc::new(IpcHandler::new(Arc::clone(&runtime), Arc::new(commands)));

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let outbound = match config.transport {
        Transport::Websocket => {
            let client = Arc::new(IpcClient::new(
                config,
                runtime.identity.clone(),
                Arc::clone(&handler),
            ));
            tasks.push(tokio::spawn(Arc::clone(&client).run()));
            Outbound::websocket(client, Arc::clone(&runtime))
        }
        Transport::Http => {
            let listener = bind_server(config.http_inbound_port).await?;
            let server_handler = Arc::clone(&handler);
            tasks.push(tokio::spawn(async move {
                if let Err(err) = serve(listener, server_handler).await {
                    error!("http ipc server stopped: {err}");
                }
            }));
            Outbound::http(
                HttpClient::new(config.http_outbound_port),
                Arc::clone(&runtime),
            )
        }
    };

    forward_listening(&runtime.state, outbound.clone());
    tasks.push(spawn_active_editor_watch(
        &active,
        workbench,
        &runtime,
        outbound,
    ));

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::Runtime(err.to_string()))?;
    info!("shutting down");
    for task in &tasks {
        task.abort();
    }

    let report = runtime.metrics.lock().await.report();
    for warning in &report.warnings {
        warn!("{warning}");
    }
    info!(?report, "runtime metrics");
    Ok(())
}

fn spawn_active_editor_watch(
    active: &ActiveEditor,
    workbench: Arc<dyn Workbench>,
    runtime: &Arc<RuntimeState>,
    outbound: Outbound,
) -> JoinHandle<()> {
    let identity = runtime.identity.to_value();
    active.spawn_polling(
        workbench,
        Duration::from_millis(runtime.config.poll_interval_ms),
        move |_| outbound.spawn_send(MESSAGE_ACTIVE, identity.clone()),
    )
}

async fn check_engine(port: u16) {
    if !is_port_available(port).await {
        info!(port, "speech engine already running");
        return;
    }

    let profile = runner_profile(Platform::current());
    info!(
        port,
        client = %client_url(),
        runtime = profile.archive_url,
        runtime_version = profile.version_tag,
        "speech engine not running yet; waiting for it to start"
    );
}

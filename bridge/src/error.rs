use thiserror::Error;

use crate::config::ConfigError;
use crate::network::IpcError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error("another voicebridge instance is already running on port {0}")]
    AlreadyRunning(u16),
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use voicebridge::config::{Transport, load_config};
use voicebridge::editor::Workbench;
use voicebridge::editor::memory::MemoryWorkbench;

#[derive(Parser, Debug)]
#[command(name = "voicebridge", about = "Voice command bridge for text editors")]
struct Cli {
    /// JSON config file; missing files fall back to defaults.
    #[arg(long, default_value = "voicebridge.json")]
    config: PathBuf,
    /// Override the configured transport (`websocket` or `http`).
    #[arg(long)]
    transport: Option<Transport>,
    /// Open this file as the active document. `SAVE` writes it back.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(err) = voicebridge::init_logging() {
        eprintln!("logging bootstrap failed: {err}");
    }

    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }

    let workbench = Arc::new(MemoryWorkbench::new());
    match &cli.file {
        Some(path) => {
            workbench
                .open_path(path.clone())
                .with_context(|| format!("failed to open {}", path.display()))?;
            info!(path = %path.display(), "opened document");
        }
        None => warn!("no --file given; commands will find no active editor"),
    }

    voicebridge::run(config, workbench as Arc<dyn Workbench>).await?;
    Ok(())
}

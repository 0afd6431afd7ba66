//! Drowsiness Monitor - Main Entry Point
//!
//! Usage: `drowsiness-monitor [settings.toml]`

use monitor::{init_logging, run, MonitorSettings};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = MonitorSettings::load(settings_path.as_deref())?;
    init_logging(settings.level(), settings.json_logs)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Reading frames from {}", settings.camera.source_dir.display());

    run(settings).await?;

    Ok(())
}

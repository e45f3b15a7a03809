mod actions;
mod api;
mod app;
mod binding;
mod cache;
mod commands;
mod config;
mod event;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sketchdesk")]
#[command(about = "A terminal client for browsing and triaging forensic sketch records")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sketchdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Sketch API base url, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Refetch the sketch list periodically while it is on screen
  #[arg(long)]
  auto_refresh: bool,
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(dirs::home_dir)
    .ok_or_else(|| eyre!("Cannot determine a directory for the log file"))?
    .join("sketchdesk");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, "sketchdesk.log"));

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sketchdesk=info".into()))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.url = url;
    config.api.base_url()?;
  }
  if args.auto_refresh {
    config.cache.auto_refresh = true;
  }
  tracing::info!(api = %config.api.url, ttl_secs = config.cache.ttl_secs, "configuration loaded");

  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}

mod api;
mod config;
mod events;
mod live;
mod model;
mod time_format;
mod tui;
mod ui;

use anyhow::{Context, Result};
use api::ApiClient;
use clap::{Parser, Subcommand};
use config::Config;
use events::AppEvent;
use live::{LiveConnection, WebSocketConnector};
use std::fs::{self, OpenOptions};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ui::App;

#[derive(Parser)]
#[command(name = "wachat")]
#[command(version)]
#[command(about = "WhatsApp Web style chat client for the terminal", long_about = None)]
struct Cli {
    /// REST API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Live-update server URL
    #[arg(long, global = true)]
    socket_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the backend health endpoint and print the result
    Health,
}

fn init_logging(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.wachat_home)
        .with_context(|| format!("Failed to create {}", config.wachat_home.display()))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
        .context("Failed to open log file")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let client = ApiClient::new(config).context("Failed to build API client")?;
    let payload = client
        .health_check()
        .await
        .with_context(|| format!("Health check against {} failed", config.api_base_url))?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn run_ui(config: Config) -> Result<()> {
    let api = Arc::new(ApiClient::new(&config).context("Failed to build API client")?);
    let live = LiveConnection::new(
        config.socket_url.clone(),
        config.request_timeout(),
        Arc::new(WebSocketConnector::default()),
    );
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<AppEvent>();
    let mut app = App::new(&config, api, live, events_tx);

    let mut terminal = tui::init()?;
    let width = terminal.size().map(|r| r.width).unwrap_or(80);
    let mut input_rx = tui::spawn_input_thread();
    app.start(width);

    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let result: Result<()> = async {
        loop {
            terminal
                .draw(|frame| app.draw(frame))
                .context("Failed to draw frame")?;

            tokio::select! {
                Some(event) = input_rx.recv() => app.handle_tui_event(event),
                Some(event) = events_rx.recv() => app.handle_event(event),
                _ = tick.tick() => {}
            }

            if app.should_quit() {
                break;
            }
        }
        Ok(())
    }
    .await;

    tui::restore()?;
    app.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.apply_overrides(cli.api_url, cli.socket_url);
    init_logging(&config)?;
    info!(
        "wachat starting (api: {}, socket: {})",
        config.api_base_url, config.socket_url
    );

    match cli.command {
        Some(Commands::Health) => health(&config).await,
        None => run_ui(config).await,
    }
}

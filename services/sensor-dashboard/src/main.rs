//! Sensor dashboard CLI
//!
//! Runs one dashboard session against a backend gateway and renders view
//! state transitions through the log.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, warn, Level};

use sensor_dashboard::{load_config, Config, DashboardSession, RemoteGateway, RenderMode, ViewState};

#[derive(Parser)]
#[command(name = "sensor-dashboard")]
#[command(about = "Live sensor telemetry dashboard session")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend gateway host (overrides config file)
    #[arg(long)]
    host: Option<String>,

    /// Backend gateway port (overrides config file)
    #[arg(long)]
    port: Option<u16>,

    /// Project identifier (overrides config file)
    #[arg(long)]
    project_id: Option<String>,

    /// Pre-issued credential token; sign-in is anonymous when absent
    #[arg(long)]
    token: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = clap::value_parser!(Level))]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let mut config = if let Some(config_path) = &args.config {
        debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        debug!("Using default configuration");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(host) = args.host {
        config.backend.host = host;
    }
    if let Some(port) = args.port {
        config.backend.port = port;
    }
    if let Some(project_id) = args.project_id {
        config.backend.project_id = project_id;
    }
    if let Some(token) = args.token {
        config.auth.credential_token = Some(token);
    }

    info!("Starting dashboard session");
    info!("Gateway: {}:{}", config.backend.host, config.backend.port);

    let gateway = Arc::new(RemoteGateway::new(config.backend.clone()));
    // A configuration error is surfaced through view state by the session;
    // only connect once the configuration is known to be usable.
    if config.validate().is_ok() {
        gateway.connect().await?;
    }

    let session = DashboardSession::new(
        config,
        Arc::clone(&gateway) as Arc<dyn sensor_dashboard::AuthBackend>,
        Arc::clone(&gateway) as Arc<dyn sensor_dashboard::DataBackend>,
    );

    let mut state_rx = session.state_receiver();
    let renderer = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            render(&state);
        }
    });

    let result = tokio::select! {
        result = session.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    };

    renderer.abort();
    gateway.disconnect().await?;
    result?;
    Ok(())
}

fn render(state: &ViewState) {
    match state.render_mode() {
        RenderMode::Loading => {
            info!("Loading sensor data...");
        }
        RenderMode::Error => {
            error!("{}", state.error.as_deref().unwrap_or("unknown error"));
        }
        RenderMode::Dashboard => {
            if let Some(message) = &state.error {
                warn!("Feed degraded: {}", message);
            }
            if let Some(latest) = &state.latest {
                info!(
                    "Latest: {:.1} C, {:.0}% rh ({})",
                    latest.temperature,
                    latest.humidity,
                    latest
                        .timestamp
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "pending".to_string())
                );
            }
            for reading in &state.window {
                info!(
                    "  [{}] {:.1} C, {:.0}% rh",
                    reading.id, reading.temperature, reading.humidity
                );
            }
        }
    }
}

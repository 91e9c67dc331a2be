use confgate::api::{ApiServer, PKG_NAME, VERSION};
use confgate::config::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("confgate=info".parse().expect("valid log directive")),
        )
        .init();

    // Load settings
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("confgate.toml"));

    let settings = if settings_path.exists() {
        let settings = Settings::load(&settings_path).map_err(|e| {
            error!(path = %settings_path.display(), error = %e, "Failed to load settings");
            e
        })?;
        info!(path = %settings_path.display(), "Settings loaded");
        settings
    } else {
        info!(path = %settings_path.display(), "Settings file not found, using defaults");
        Settings::default()
    };

    info!(name = PKG_NAME, version = VERSION, "Starting nginx config sidecar");
    info!(
        bind = %settings.server.bind,
        port = settings.server.port,
        nginx_binary = %settings.nginx.binary,
        config_dir = %settings.nginx.config_dir.display(),
        scratch_dir = %settings.nginx.scratch_dir.display(),
        "Server configuration"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api = Arc::new(ApiServer::new(&settings, shutdown_rx).await?);
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api.run().await {
            error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for the server to stop (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), api_handle).await;

    info!("Shutdown complete");
    Ok(())
}

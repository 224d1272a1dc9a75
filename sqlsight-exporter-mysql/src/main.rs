//! Prometheus exporter for MySQL server metrics.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use sqlsight_exporter_mysql::{ExporterConfig, HttpServer, MySqlExporter};

/// Prometheus exporter for MySQL server metrics.
#[derive(Parser, Debug)]
#[command(name = "sqlsight-exporter-mysql")]
#[command(about = "Export MySQL server metrics for Prometheus")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// MySQL connection URL (overrides config).
    #[arg(long, env = "DATA_SOURCE_NAME", hide_env_values = true)]
    dsn: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides config; trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Apply CLI overrides
    if let Some(dsn) = args.dsn {
        config.mysql.dsn = dsn;
    }
    if let Some(listen) = args.listen {
        config.web.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    sqlsight_common::init_tracing(&config.logging)?;

    info!("Starting SQLSight MySQL Exporter");

    let exporter = Arc::new(MySqlExporter::mysql(&config)?);

    let listen_addr = config
        .web
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(exporter.clone(), listen_addr, config.web.path.clone());
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!(
        scrapes = exporter.total_scrapes(),
        last_scrape_error = exporter.last_scrape_error(),
        "Exporter stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

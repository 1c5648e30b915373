use anyhow::{Context, Result};
use clap::Parser;
use powermeter_exporter::cli::Cli;
use powermeter_exporter::config::{AcquisitionMode, Config};
use powermeter_exporter::exporter::Exporter;
use powermeter_exporter::metrics::MeterMetrics;
use powermeter_exporter::serial::SerialFrameReader;
use powermeter_exporter::web::{self, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    powermeter_exporter::logging::init_logging(&config.logging)
        .context("Failed to initialize logging")?;

    info!(
        "powermeter_exporter {} starting for meter '{}' on {}",
        env!("APP_VERSION"),
        config.meter.name,
        config.meter.device
    );

    let metrics = Arc::new(MeterMetrics::new(&config.meter.name));
    let source = Arc::new(SerialFrameReader::new(&config.meter));
    let exporter = Arc::new(Exporter::new(source, metrics));

    let background = match config.acquisition.mode {
        AcquisitionMode::Background => Some(exporter.spawn_background(Duration::from_secs(
            config.acquisition.interval_seconds,
        ))),
        AcquisitionMode::OnRequest => {
            info!("Acquiring on each request to /");
            None
        }
    };

    let state = AppState {
        exporter,
        mode: config.acquisition.mode,
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let served = web::serve(state, &config.web.host, config.web.port, shutdown).await;

    if let Some(task) = background {
        task.abort();
    }
    served.context("Web server error")?;
    info!("Shutdown complete");
    Ok(())
}

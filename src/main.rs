use anyhow::Context;
use clap::Parser;
use fxtrader::api::OandaClient;
use fxtrader::config::TraderConfig;
use fxtrader::execution::Controller;
use fxtrader::indicators::IndicatorRegistry;
use fxtrader::logging::setup_logging;
use fxtrader::strategy::{Pipeline, SignalRegistry};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fxtrader", about = "Single-instrument FX execution loop for OANDA v20")]
struct Args {
    /// TOML configuration file (defaults to ./trader.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the rolling per-instrument log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = TraderConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let _log_guard = setup_logging(&args.log_dir, &config.strategy.instrument)
        .context("Failed to set up logging")?;

    tracing::info!(
        instrument = %config.strategy.instrument,
        granularity = %config.strategy.granularity,
        environment = ?config.venue.environment,
        "fxtrader starting"
    );

    let pipeline = Pipeline::from_config(
        &config.strategy,
        &IndicatorRegistry::with_builtins(),
        &SignalRegistry::with_builtins(),
    )
    .context("Failed to build signal pipeline")?;

    let client = OandaClient::new(&config.venue, config.controller.request_timeout())
        .context("Failed to create OANDA client")?;
    tracing::info!("Trading on account {}", client.account_id());

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, stopping after the current tick");
            let _ = stop_tx.send(true);
        }
    });

    let mut controller = Controller::new(client, config.strategy, config.controller, pipeline);
    controller
        .run(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    Ok(())
}

mod bias;
mod config;
mod error;
mod indicator;
mod model;
mod normalize;
mod payload;
mod pipeline;
mod series;
mod snapshot;
mod source;
mod ticker;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use source::PayloadSource;
use source::file::FileSource;
use source::mexc::MexcSource;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("payload source error")]
    Source,
    #[display("output error")]
    Output,
    #[display("every pair failed")]
    AllPairsFailed,
}

#[derive(Parser)]
#[command(
    name = "candle-snapshot",
    about = "Normalize exchange candle payloads into an indicator snapshot"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Source ────────────────────────────────────────────────────────────────
    let source = build_source(&config)?;
    info!(
        source = source.name(),
        pairs = config.pairs.len(),
        "building snapshot"
    );

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl+c received, cancelling");
            cancel_on_signal.cancel();
        }
    });

    // ── Snapshot ──────────────────────────────────────────────────────────────
    let snapshot = pipeline::build_snapshot(source, &config, cancel).await;

    let json = serde_json::to_string_pretty(&snapshot).change_context(AppError::Output)?;
    println!("{json}");

    info!(
        entries = snapshot.entries.len(),
        failures = snapshot.failures.len(),
        "snapshot complete"
    );

    if snapshot.is_total_failure() {
        return Err(Report::new(AppError::AllPairsFailed)
            .attach(format!("failures: {:?}", snapshot.failures)));
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn build_source(config: &AppConfig) -> Result<Arc<dyn PayloadSource>, Report<AppError>> {
    let source = &config.source;
    match source.kind.as_str() {
        "mexc" => {
            let mexc = MexcSource::new(
                &source.base_url,
                source.requests_per_second,
                Duration::from_secs(source.timeout_secs),
            )
            .change_context(AppError::Source)?;
            Ok(Arc::new(mexc))
        }
        _ => Ok(Arc::new(FileSource::new(&source.dir))),
    }
}

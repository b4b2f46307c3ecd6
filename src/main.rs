//! Main entry point for the activity-harvester CLI

use activity_harvester::cli::Cli;
use activity_harvester::harvester::JobStatus;
use activity_harvester::metrics::init_metrics;
use activity_harvester::shutdown::CancelSignal;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("activity_harvester=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<JobStatus> {
    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)?;
    }

    // Ctrl+C stops new chunks from starting; in-flight pages finish and progress is kept
    let cancel = CancelSignal::shared();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight pages and saving progress...");
                cancel.cancel();
            }
        }
    });

    Ok(cli.execute(cancel).await?)
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(JobStatus::Finished) => {}
        Ok(status) => {
            error!(status = %status, "Job did not finish");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

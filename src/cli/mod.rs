//! CLI command implementations

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

pub mod error;
pub mod harvest;

pub use error::CliError;
pub use harvest::{HarvestArgs, JobArgs};

use crate::harvester::config::DEFAULT_MAX_RETRIES;
use crate::harvester::JobStatus;
use crate::shutdown::SharedCancel;

/// Command line interface
#[derive(Parser, Debug)]
#[command(name = "activity-harvester")]
#[command(about = "Harvest developer activity from rate-limited platform APIs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for the final report (human or json)
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Maximum number of retries per page for rate-limited or transient failures (range: 0-20)
    #[arg(
        long,
        global = true,
        env = "HARVEST_MAX_RETRIES",
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true, env = "HARVEST_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest a date range, resuming from recorded progress
    Harvest(HarvestArgs),

    /// Show which chunks of a job are recorded complete
    Status(JobArgs),

    /// Forget recorded progress for a job
    Reset(JobArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl Cli {
    /// Execute the selected command
    ///
    /// Returns the job status for `harvest`; `status` and `reset` report `Finished`.
    pub async fn execute(&self, cancel: SharedCancel) -> Result<JobStatus, CliError> {
        match &self.command {
            Commands::Harvest(args) => args.execute(self, cancel).await,
            Commands::Status(args) => {
                args.execute_status(self.output_format).await?;
                Ok(JobStatus::Finished)
            }
            Commands::Reset(args) => {
                args.execute_reset(self.output_format).await?;
                Ok(JobStatus::Finished)
            }
        }
    }
}

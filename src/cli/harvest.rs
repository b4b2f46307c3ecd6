//! Harvest, status and reset command implementations

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Cli, CliError, OutputFormat};
use crate::backoff::BackoffPolicy;
use crate::credential::CredentialPool;
use crate::fetcher::{create_page_source, PagedFetcher};
use crate::harvester::config::{
    DEFAULT_GRANULARITY_DAYS, DEFAULT_REQUEST_TIMEOUT, MAX_GRANULARITY_DAYS, MAX_PARALLELISM,
};
use crate::harvester::{HarvestJob, Harvester, HarvesterConfig, JobStatus};
use crate::progress::{FileProgressStore, ProgressTracker};
use crate::shutdown::SharedCancel;
use crate::sink::create_file_sink;
use crate::split::DateRange;
use crate::{EntityKind, Platform};

/// Default directory for progress documents
const DEFAULT_PROGRESS_DIR: &str = ".harvest/progress";

/// Default directory for output files when `--output` is omitted
const DEFAULT_OUTPUT_DIR: &str = "harvest";

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_PARALLELISM {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_PARALLELISM}"
        ));
    }
    Ok(value)
}

/// Arguments identifying one job
#[derive(Args, Debug)]
pub struct JobArgs {
    /// Platform (github, jira, stackexchange)
    #[arg(long)]
    pub platform: Platform,

    /// Entity kind (commit, issue, pull_request, branch, question, answer)
    #[arg(long)]
    pub kind: EntityKind,

    /// Repository (owner/repo), Jira project key, or Stack Exchange site
    #[arg(long)]
    pub scope: String,

    /// Start date (YYYY-MM-DD, or RFC3339)
    #[arg(long)]
    pub start: String,

    /// End date (YYYY-MM-DD is inclusive of that day, RFC3339 is exclusive)
    #[arg(long)]
    pub end: String,

    /// Chunk width in days
    #[arg(
        long,
        default_value_t = DEFAULT_GRANULARITY_DAYS,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_GRANULARITY_DAYS))
    )]
    pub granularity_days: u32,

    /// Directory holding progress documents
    #[arg(long, env = "HARVEST_PROGRESS_DIR", default_value = DEFAULT_PROGRESS_DIR)]
    pub progress_dir: PathBuf,
}

impl JobArgs {
    /// Build the job these arguments describe
    pub fn to_job(&self) -> Result<HarvestJob, CliError> {
        let range = DateRange::parse(&self.start, &self.end)?;
        Ok(HarvestJob::new(
            self.platform,
            self.kind,
            &self.scope,
            range,
            self.granularity_days,
        )?)
    }

    fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new(Arc::new(FileProgressStore::new(&self.progress_dir)))
    }

    /// Print the chunks recorded complete for the job
    pub async fn execute_status(&self, format: OutputFormat) -> Result<(), CliError> {
        let job = self.to_job()?;
        let total = job.chunks().len();
        let records = self.tracker().completed_chunks(job.identity()).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "job": job.identity(),
                    "total_chunks": total,
                    "completed_chunks": records.len(),
                    "records": records,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output).unwrap_or_default()
                );
            }
            OutputFormat::Human => {
                println!("Job:       {}", job.identity());
                println!("Completed: {}/{} chunks", records.len(), total);
                for record in &records {
                    println!(
                        "  {}  {} items  (at {})",
                        record.chunk,
                        record.items,
                        record.completed_at.to_rfc3339()
                    );
                }
            }
        }
        Ok(())
    }

    /// Remove every completion record for the job
    pub async fn execute_reset(&self, format: OutputFormat) -> Result<(), CliError> {
        let job = self.to_job()?;
        let removed = self.tracker().reset(job.identity()).await?;

        match format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "job": job.identity(), "removed": removed })
            ),
            OutputFormat::Human => {
                println!("Removed {removed} completion records for {}", job.identity())
            }
        }
        Ok(())
    }
}

/// Arguments for the harvest command
#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Job to run
    #[command(flatten)]
    pub job: JobArgs,

    /// Chunks fetched concurrently (default: number of credentials, max: 32)
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Output file; `.csv` writes CSV, anything else JSON Lines
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Override the API base URL (required for Jira)
    #[arg(long, env = "HARVEST_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-request network timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Comma separated credentials (falls back to the platform's environment variable)
    #[arg(long, value_delimiter = ',')]
    pub tokens: Vec<String>,

    /// Remaining quota that triggers credential rotation (default: per endpoint)
    #[arg(long, env = "HARVEST_QUOTA_THRESHOLD", value_parser = clap::value_parser!(i64).range(0..))]
    pub quota_threshold: Option<i64>,
}

impl HarvestArgs {
    /// Run the job and print its report
    pub async fn execute(&self, cli: &Cli, cancel: SharedCancel) -> Result<JobStatus, CliError> {
        let job = self.job.to_job()?;

        let pool = Arc::new(CredentialPool::from_secrets(self.secrets()?)?);
        let source = create_page_source(
            job.platform(),
            self.base_url.as_deref(),
            Duration::from_secs(self.timeout_secs.max(1)),
        )?;
        let backoff = BackoffPolicy::default().with_max_retries(cli.max_retries);
        let mut fetcher = PagedFetcher::new(source, Arc::clone(&pool), backoff);
        if let Some(threshold) = self.quota_threshold {
            fetcher = fetcher.with_quota_threshold(threshold);
        }

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&job));
        let sink = create_file_sink(&output)?;

        let mut config = HarvesterConfig::for_pool_size(pool.len());
        if let Some(concurrency) = self.concurrency {
            config = config.with_parallelism(concurrency);
        }

        let mut harvester = Harvester::new(fetcher, self.job.tracker(), sink)
            .with_config(config)
            .with_cancel(cancel);
        let progress = (cli.output_format == OutputFormat::Human).then(create_progress_bar);
        if let Some(bar) = &progress {
            harvester = harvester.with_progress_bar(bar.clone());
        }

        info!(
            job = %job.identity(),
            output = %output.display(),
            credentials = pool.len(),
            "Starting harvest"
        );
        let report = harvester.run(&job).await?;
        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&report).unwrap_or_default()
            ),
            OutputFormat::Human => {
                println!("{report}");
                println!("Output:    {}", output.display());
            }
        }

        let status = report.status();
        if status == JobStatus::Cancelled {
            warn!(
                pending = report.pending_count(),
                "Harvest cancelled; rerun the same command to resume"
            );
        }
        Ok(status)
    }

    /// Credentials from `--tokens`, else from the platform's environment variable
    fn secrets(&self) -> Result<Vec<String>, CliError> {
        let secrets: Vec<String> = if self.tokens.is_empty() {
            let var = self.job.platform.credentials_env_var();
            std::env::var(var)
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else {
            self.tokens
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        if secrets.is_empty() {
            return Err(CliError::ConfigurationError(format!(
                "no credentials: pass --tokens or set {}",
                self.job.platform.credentials_env_var()
            )));
        }
        Ok(secrets)
    }
}

/// `harvest/<job file stem>.jsonl`
fn default_output_path(job: &HarvestJob) -> PathBuf {
    Path::new(DEFAULT_OUTPUT_DIR).join(format!("{}.jsonl", job.identity().file_stem()))
}

fn create_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

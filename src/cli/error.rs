//! CLI error types and conversions

use crate::credential::PoolError;
use crate::fetcher::FetchError;
use crate::harvester::HarvestError;
use crate::metrics::MetricsError;
use crate::progress::ProgressStoreError;
use crate::sink::SinkError;
use crate::split::RangeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Harvest error
    #[error("harvest error: {0}")]
    HarvestError(#[from] HarvestError),

    /// Fetcher setup error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetchError),

    /// Progress store error
    #[error("progress error: {0}")]
    ProgressError(#[from] ProgressStoreError),

    /// Output sink error
    #[error("output error: {0}")]
    OutputError(#[from] SinkError),

    /// Credential configuration error
    #[error("credential error: {0}")]
    CredentialError(#[from] PoolError),

    /// Date range error
    #[error("date range error: {0}")]
    RangeError(#[from] RangeError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

//! Paged fetching against platform list endpoints

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::ErrorClass;
use crate::credential::{Credential, QuotaInfo};
use crate::split::DateChunk;
use crate::Platform;

pub mod classify;
pub mod dialect;
pub mod endpoint;
pub mod github;
pub mod http;
pub mod jira;
pub mod paged;
pub mod stack_exchange;

pub use classify::classify;
pub use endpoint::EndpointSpec;
pub use paged::PagedFetcher;

/// Failure of a single page request, before classification
#[derive(Debug, Clone, thiserror::Error)]
pub enum PageError {
    /// Non-2xx response
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
        /// Quota metadata carried by the error response
        quota: QuotaInfo,
    },

    /// Connection, DNS or timeout failure
    #[error("network error: {message}")]
    Network {
        /// Error description
        message: String,
        /// Whether the request timed out
        timeout: bool,
    },

    /// 2xx response whose body could not be understood
    #[error("decode error: {0}")]
    Decode(String),
}

impl PageError {
    /// Quota metadata carried by the failure, if any
    pub fn quota(&self) -> QuotaInfo {
        match self {
            PageError::Status { quota, .. } => *quota,
            _ => QuotaInfo::default(),
        }
    }

    /// HTTP status, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            PageError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classified failure of a whole fetch, surfaced for the current chunk
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Rate limiting persisted past the retry limit
    #[error("rate limited after {attempts} attempts: {message}")]
    RateLimited {
        /// Failed attempts for the page
        attempts: u32,
        /// Last error
        message: String,
    },

    /// Transient failures persisted past the retry limit
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient {
        /// Failed attempts for the page
        attempts: u32,
        /// Last error
        message: String,
    },

    /// The request itself is invalid; retrying cannot help
    #[error("client error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ClientError {
        /// HTTP status, when one was received
        status: Option<u16>,
        /// Error description
        message: String,
    },

    /// Cancellation was requested before the fetch finished
    #[error("fetch cancelled")]
    Cancelled,

    /// Pagination did not terminate within the page limit
    #[error("pagination exceeded {0} pages")]
    TooManyPages(usize),

    /// Source could not be configured (bad base URL, TLS setup)
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FetchError {
    /// Build the surfaced error for a page failure the policy gave up on
    pub fn from_page(class: ErrorClass, attempts: u32, error: &PageError) -> Self {
        let message = format!("{} ({error})", classify::description(error));
        match class {
            ErrorClass::RateLimited => FetchError::RateLimited { attempts, message },
            ErrorClass::Transient | ErrorClass::QuotaCriticallyLow => {
                FetchError::Transient { attempts, message }
            }
            ErrorClass::ClientError => FetchError::ClientError {
                status: error.status(),
                message,
            },
        }
    }

    /// Whether a later run may succeed on the same chunk
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Transient { .. } | FetchError::Cancelled
        )
    }

    /// Retry class the failure was surfaced under, if it came from a page
    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            FetchError::RateLimited { .. } => Some(ErrorClass::RateLimited),
            FetchError::Transient { .. } => Some(ErrorClass::Transient),
            FetchError::ClientError { .. } => Some(ErrorClass::ClientError),
            FetchError::Cancelled | FetchError::TooManyPages(_) | FetchError::Configuration(_) => None,
        }
    }

    /// Remediation hint for the failure
    pub fn suggestion(&self) -> Option<&'static str> {
        self.error_class().map(classify::suggestion)
    }

    /// Short label for logs and metrics
    pub fn class_label(&self) -> &'static str {
        match self {
            FetchError::RateLimited { .. } => ErrorClass::RateLimited.as_str(),
            FetchError::Transient { .. } => ErrorClass::Transient.as_str(),
            FetchError::ClientError { .. } => ErrorClass::ClientError.as_str(),
            FetchError::Cancelled => "cancelled",
            FetchError::TooManyPages(_) => "too_many_pages",
            FetchError::Configuration(_) => "configuration",
        }
    }
}

/// Result type for fetch operations
pub type FetchOutcome<T> = Result<T, FetchError>;

/// One successfully fetched page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    /// Raw records in API order
    pub items: Vec<serde_json::Value>,
    /// Cursor for the next page; `None` when this was the last page
    pub next_cursor: Option<String>,
    /// Quota metadata from the response
    pub quota: QuotaInfo,
    /// Server-requested pause before the next request
    pub min_delay: Option<Duration>,
}

/// Lazy stream of records across pages
pub type ItemStream = Pin<Box<dyn Stream<Item = FetchOutcome<serde_json::Value>> + Send>>;

/// Lazy stream of whole pages
pub type PageStream = Pin<Box<dyn Stream<Item = FetchOutcome<Vec<serde_json::Value>>> + Send>>;

/// Source of single pages; one request per call and no retries of its own
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of `endpoint` filtered to `filter`
    ///
    /// # Arguments
    /// * `endpoint` - Resolved list endpoint
    /// * `filter` - Date window (ignored by undated endpoints)
    /// * `cursor` - `None` for the first page, else the previous `next_cursor`
    /// * `credential` - Credential to authenticate with
    async fn fetch_page(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<FetchResult, PageError>;
}

/// Create the HTTP page source for `platform`
///
/// # Arguments
/// * `platform` - Target platform
/// * `base_url` - Override for the API base URL (required for Jira)
/// * `timeout` - Per-request timeout
pub fn create_page_source(
    platform: Platform,
    base_url: Option<&str>,
    timeout: Duration,
) -> FetchOutcome<Arc<dyn PageSource>> {
    let source = match base_url {
        Some(url) => http::HttpPageSource::with_base_url(platform, url)?,
        None => http::HttpPageSource::new(platform)?,
    };
    Ok(Arc::new(source.with_timeout(timeout)?))
}

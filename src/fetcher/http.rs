//! HTTP page source over `reqwest`
//!
//! One request per call. Retries, backoff and credential rotation belong to
//! [`super::PagedFetcher`]; this layer only maps the wire to [`FetchResult`] or
//! [`PageError`].

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::dialect::{dialect_for, Auth, Dialect, RawResponse};
use super::endpoint::EndpointSpec;
use super::github::GITHUB_API_BASE_URL;
use super::stack_exchange::STACK_EXCHANGE_API_BASE_URL;
use super::{FetchError, FetchOutcome, FetchResult, PageError, PageSource};
use crate::credential::{Credential, QuotaInfo};
use crate::harvester::config::DEFAULT_REQUEST_TIMEOUT;
use crate::metrics::RequestMetrics;
use crate::split::DateChunk;
use crate::Platform;

/// HTTP connect timeout - time to establish the TCP connection
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error bodies are truncated to this many characters
const MAX_ERROR_BODY_CHARS: usize = 2_000;

/// Longest `Retry-After` honoured; larger values are clamped to it
const MAX_RETRY_AFTER_SECS: i64 = 24 * 60 * 60;

const USER_AGENT: &str = concat!("activity-harvester/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration) -> FetchOutcome<Client> {
    Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FetchError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Default API base URL for a platform (Jira has none; every site has its own host)
pub fn default_base_url(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::GitHub => Some(GITHUB_API_BASE_URL),
        Platform::StackExchange => Some(STACK_EXCHANGE_API_BASE_URL),
        Platform::Jira => None,
    }
}

/// Page source speaking one platform's HTTP dialect
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    platform: Platform,
    dialect: &'static dyn Dialect,
}

impl HttpPageSource {
    /// Source against the platform's public API host
    ///
    /// # Errors
    /// Jira requires an explicit base URL; use [`Self::with_base_url`].
    pub fn new(platform: Platform) -> FetchOutcome<Self> {
        let base_url = default_base_url(platform).ok_or_else(|| {
            FetchError::Configuration(format!("{platform} requires an explicit --base-url"))
        })?;
        Self::with_base_url(platform, base_url)
    }

    /// Source against a custom host (Jira site, GitHub Enterprise, test server)
    pub fn with_base_url(platform: Platform, base_url: &str) -> FetchOutcome<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(FetchError::Configuration(format!(
                "base URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        Ok(Self {
            client: build_client(DEFAULT_REQUEST_TIMEOUT)?,
            base_url: base_url.to_string(),
            platform,
            dialect: dialect_for(platform),
        })
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> FetchOutcome<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// `Retry-After` in seconds, as a reset time
fn retry_after(response: &RawResponse) -> Option<chrono::DateTime<Utc>> {
    let seconds = response
        .header_i64("retry-after")?
        .clamp(0, MAX_RETRY_AFTER_SECS);
    Utc::now().checked_add_signed(chrono::Duration::try_seconds(seconds)?)
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Map a raw response through a dialect
pub(crate) fn interpret(
    dialect: &dyn Dialect,
    endpoint: &EndpointSpec,
    cursor: Option<&str>,
    response: &RawResponse,
) -> Result<FetchResult, PageError> {
    if response.is_success() {
        return dialect.parse_page(endpoint, cursor, response);
    }

    let mut quota: QuotaInfo = dialect.quota(response);
    if quota.reset_at.is_none() {
        quota.reset_at = retry_after(response);
    }
    Err(PageError::Status {
        status: response.status,
        body: truncate(&response.body),
        quota,
    })
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<FetchResult, PageError> {
        let request = self
            .dialect
            .build_request(endpoint, filter, cursor, credential)?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.get(&url).query(&request.query);
        builder = match &request.auth {
            Auth::Header { name, value } => builder.header(name.as_str(), value.as_str()),
            Auth::Basic { user, password } => builder.basic_auth(user, Some(password)),
            Auth::Query { name, value } => builder.query(&[(name.as_str(), value.as_str())]),
        };
        if self.platform == Platform::GitHub {
            builder = builder.header("Accept", "application/vnd.github+json");
        }

        debug!(
            url = %url,
            cursor = cursor.unwrap_or("-"),
            credential = %credential.identifier(),
            "Requesting page"
        );

        let metrics = RequestMetrics::start(self.platform);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics.record("network_error");
                return Err(PageError::Network {
                    message: e.to_string(),
                    timeout: e.is_timeout(),
                });
            }
        };

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                metrics.record("network_error");
                return Err(PageError::Network {
                    message: format!("failed to read body: {e}"),
                    timeout: e.is_timeout(),
                });
            }
        };
        metrics.record(status.to_string());

        interpret(self.dialect, endpoint, cursor, &RawResponse::new(status, headers, body))
    }
}

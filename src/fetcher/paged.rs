//! Paged fetching with backoff, quota tracking and credential rotation
//!
//! [`PagedFetcher::fetch_all`] turns one logical "list everything matching this
//! filter" operation into a lazy stream of records. Each page goes through the
//! same loop:
//!
//! 1. hold a credential (acquired from the pool, waiting while the pool is blocked)
//! 2. request the page
//! 3. on success, report quota, emit the items, follow the cursor
//! 4. on failure, classify and ask [`BackoffPolicy`] whether to retry, rotate or abort
//!
//! Items already yielded are never re-emitted: a retry repeats only the page
//! that failed. The stream is not restartable mid-way; callers that need
//! resumption restart from page one and rely on chunk-level idempotence.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{classify, EndpointSpec, FetchError, FetchOutcome, FetchResult, ItemStream, PageSource, PageStream};
use crate::backoff::{BackoffPolicy, ErrorClass, RetryDecision};
use crate::credential::{Credential, CredentialPool};
use crate::harvester::config::MAX_PAGES_PER_FETCH;
use crate::metrics::{record_rate_limited, record_retry};
use crate::shutdown::{CancelSignal, SharedCancel};
use crate::split::DateChunk;

/// Fetches every page of an endpoint for one date filter
#[derive(Clone)]
pub struct PagedFetcher {
    source: Arc<dyn PageSource>,
    pool: Arc<CredentialPool>,
    backoff: BackoffPolicy,
    quota_threshold: Option<i64>,
    max_pages: usize,
    cancel: SharedCancel,
}

impl PagedFetcher {
    /// Create a fetcher using each endpoint's quota threshold and no cancellation
    ///
    /// # Arguments
    /// * `source` - Page source (HTTP or scripted)
    /// * `pool` - Credential pool shared by all concurrent fetches
    /// * `backoff` - Retry policy
    pub fn new(source: Arc<dyn PageSource>, pool: Arc<CredentialPool>, backoff: BackoffPolicy) -> Self {
        Self {
            source,
            pool,
            backoff,
            quota_threshold: None,
            max_pages: MAX_PAGES_PER_FETCH,
            cancel: CancelSignal::shared(),
        }
    }

    /// Remaining quota below which a successful response triggers rotation,
    /// overriding [`EndpointSpec::quota_threshold`] for every endpoint
    pub fn with_quota_threshold(mut self, threshold: i64) -> Self {
        self.quota_threshold = Some(threshold.max(0));
        self
    }

    /// Override the page limit per fetch
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Observe `cancel` before each page and during every wait
    pub fn with_cancel(mut self, cancel: SharedCancel) -> Self {
        self.cancel = cancel;
        self
    }

    /// Shared credential pool
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Cancellation signal observed by this fetcher
    pub fn cancel_signal(&self) -> &SharedCancel {
        &self.cancel
    }

    /// Retry policy applied to every page
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Lazy stream of every record matching `filter`
    pub fn fetch_all(&self, endpoint: &EndpointSpec, filter: DateChunk) -> ItemStream {
        self.fetch_pages(endpoint, filter)
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, FetchError>)))
            .try_flatten()
            .boxed()
    }

    /// Lazy stream of pages matching `filter`
    ///
    /// The stream ends after the first error.
    pub fn fetch_pages(&self, endpoint: &EndpointSpec, filter: DateChunk) -> PageStream {
        let state = FetchState {
            fetcher: self.clone(),
            endpoint: endpoint.clone(),
            filter,
            cursor: None,
            pages: 0,
            finished: false,
            credential: None,
            pause: None,
        };
        stream::unfold(state, |mut state| async move {
            state.next_page().await.map(|page| (page, state))
        })
        .boxed()
    }

    /// Request one page until it succeeds or the policy gives up
    async fn fetch_page_with_retry(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        held: &mut Option<Credential>,
    ) -> FetchOutcome<(FetchResult, Credential)> {
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let credential = match held.take() {
                Some(credential) => credential,
                None => self
                    .pool
                    .acquire_or_wait(&self.cancel)
                    .await
                    .ok_or(FetchError::Cancelled)?,
            };

            let error = match self.source.fetch_page(endpoint, filter, cursor, &credential).await {
                Ok(result) => {
                    self.pool.report(&credential, result.quota);
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Page request succeeded after retry");
                    }
                    return Ok((result, credential));
                }
                Err(error) => error,
            };

            attempt += 1;
            let class = classify(&error);
            self.pool.report(&credential, error.quota());

            let mut keep_credential = true;
            if class == ErrorClass::RateLimited {
                record_rate_limited(endpoint.platform);
                if let Some(reset_at) = error.quota().reset_at {
                    self.pool.mark_exhausted(&credential, reset_at);
                }
                keep_credential = false;
            }

            match self.backoff.decide(class, attempt) {
                RetryDecision::Abort => {
                    warn!(
                        platform = %endpoint.platform,
                        scope = %endpoint.scope,
                        chunk = %filter,
                        class = %class,
                        attempts = attempt,
                        error = %error,
                        "Giving up on page"
                    );
                    return Err(FetchError::from_page(class, attempt, &error));
                }
                RetryDecision::Retry { after } => {
                    record_retry(endpoint.platform, class.as_str(), after);
                    warn!(
                        platform = %endpoint.platform,
                        chunk = %filter,
                        class = %class,
                        attempt = attempt,
                        max_retries = self.backoff.max_retries(),
                        backoff_ms = after.as_millis() as u64,
                        error = %error,
                        "Retrying page after backoff"
                    );
                    if !self.cancel.sleep(after).await {
                        return Err(FetchError::Cancelled);
                    }
                }
                RetryDecision::SwitchCredential => keep_credential = false,
            }

            if keep_credential {
                *held = Some(credential);
            }
        }
    }
}

/// Per-stream pagination state
struct FetchState {
    fetcher: PagedFetcher,
    endpoint: EndpointSpec,
    filter: DateChunk,
    cursor: Option<String>,
    pages: usize,
    finished: bool,
    credential: Option<Credential>,
    pause: Option<Duration>,
}

impl FetchState {
    async fn next_page(&mut self) -> Option<FetchOutcome<Vec<serde_json::Value>>> {
        if self.finished {
            return None;
        }
        if self.pages >= self.fetcher.max_pages {
            self.finished = true;
            return Some(Err(FetchError::TooManyPages(self.fetcher.max_pages)));
        }
        if let Some(pause) = self.pause.take() {
            if !self.fetcher.cancel.sleep(pause).await {
                self.finished = true;
                return Some(Err(FetchError::Cancelled));
            }
        }

        let outcome = self
            .fetcher
            .fetch_page_with_retry(
                &self.endpoint,
                &self.filter,
                self.cursor.as_deref(),
                &mut self.credential,
            )
            .await;

        let (result, credential) = match outcome {
            Ok(ok) => ok,
            Err(error) => {
                self.finished = true;
                return Some(Err(error));
            }
        };

        self.pages += 1;
        self.pause = result.min_delay;
        self.credential = Some(credential);
        self.rotate_if_quota_low(&result);

        debug!(
            chunk = %self.filter,
            page = self.pages,
            items = result.items.len(),
            has_next = result.next_cursor.is_some(),
            "Fetched page"
        );

        match result.next_cursor {
            Some(next) if !result.items.is_empty() => self.cursor = Some(next),
            _ => self.finished = true,
        }
        Some(Ok(result.items))
    }

    /// Rotate away from a credential whose quota fell below the threshold
    ///
    /// With no alternative, the next page waits until the credential resets.
    fn rotate_if_quota_low(&mut self, result: &FetchResult) {
        let Some(remaining) = result.quota.remaining else {
            return;
        };
        let threshold = self
            .fetcher
            .quota_threshold
            .unwrap_or(self.endpoint.quota_threshold);
        if remaining >= threshold {
            return;
        }
        let Some(current) = self.credential.take() else {
            return;
        };

        match self.fetcher.pool.acquire_other(&current) {
            Some(other) => {
                debug!(
                    remaining = remaining,
                    from = %current.identifier(),
                    to = %other.identifier(),
                    "Quota critically low, switched credential"
                );
                self.credential = Some(other);
            }
            None => {
                let wait = result
                    .quota
                    .reset_at
                    .and_then(|reset| (reset - Utc::now()).to_std().ok())
                    .unwrap_or_else(|| self.fetcher.backoff.delay_for(1));
                warn!(
                    remaining = remaining,
                    credential = %current.identifier(),
                    wait_secs = wait.as_secs(),
                    "Quota critically low and no other credential usable, pausing"
                );
                record_rate_limited(self.endpoint.platform);
                self.pause = Some(self.pause.map_or(wait, |p| p.max(wait)));
                self.credential = Some(current);
            }
        }
    }
}

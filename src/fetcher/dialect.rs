//! Transport-independent request/response shapes and the per-platform dialect seam
//!
//! A [`Dialect`] turns an endpoint, a chunk filter and a cursor into a
//! [`PageRequest`], and turns a [`RawResponse`] back into a [`FetchResult`].
//! Dialects never perform I/O, which keeps them testable without a server.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::endpoint::EndpointSpec;
use super::{FetchResult, PageError};
use crate::credential::{Credential, QuotaInfo};
use crate::split::DateChunk;
use crate::Platform;

/// How a credential is attached to a request
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Raw header value (e.g. `Authorization: token ...`)
    Header {
        /// Header name
        name: String,
        /// Header value
        value: String,
    },
    /// HTTP basic authentication
    Basic {
        /// User name (Jira: account email)
        user: String,
        /// Password (Jira: API token)
        password: String,
    },
    /// Query string parameter (Stack Exchange `key`)
    Query {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Header { name, .. } => write!(f, "Header({name}: <redacted>)"),
            Auth::Basic { user, .. } => write!(f, "Basic({user}:<redacted>)"),
            Auth::Query { name, .. } => write!(f, "Query({name}=<redacted>)"),
        }
    }
}

/// One page request, ready for any HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Path relative to the platform base URL
    pub path: String,
    /// Query parameters in order
    pub query: Vec<(String, String)>,
    /// Credential attachment
    pub auth: Auth,
}

impl PageRequest {
    /// Value of a query parameter, if present
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Response as seen by a dialect: status, lowercased headers and body text
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Header map keyed by lowercase name
    pub headers: HashMap<String, String>,
    /// Body text
    pub body: String,
}

impl RawResponse {
    /// Build a response; header names are lowercased
    pub fn new<I, K, V>(status: u16, headers: I, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body: body.into(),
        }
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Header parsed as an integer
    pub fn header_i64(&self, name: &str) -> Option<i64> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Platform-specific request building and response parsing
pub trait Dialect: Send + Sync {
    /// Build the request for one page
    ///
    /// `cursor` is `None` for the first page and otherwise the value returned in
    /// the previous [`FetchResult::next_cursor`].
    fn build_request(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<PageRequest, PageError>;

    /// Quota metadata carried by any response, success or not
    fn quota(&self, response: &RawResponse) -> QuotaInfo;

    /// Parse a 2xx response into items and the next cursor
    fn parse_page(
        &self,
        endpoint: &EndpointSpec,
        cursor: Option<&str>,
        response: &RawResponse,
    ) -> Result<FetchResult, PageError>;
}

/// Dialect for `platform`
pub fn dialect_for(platform: Platform) -> &'static dyn Dialect {
    match platform {
        Platform::GitHub => &super::github::GitHubDialect,
        Platform::Jira => &super::jira::JiraDialect,
        Platform::StackExchange => &super::stack_exchange::StackExchangeDialect,
    }
}

/// Parse a response body as JSON, mapping failures to [`PageError::Decode`]
pub(crate) fn parse_json(body: &str) -> Result<serde_json::Value, PageError> {
    serde_json::from_str(body).map_err(|e| PageError::Decode(format!("invalid JSON body: {e}")))
}

/// Parse a page-number cursor (`None` means page 1)
pub(crate) fn page_number(cursor: Option<&str>) -> Result<u64, PageError> {
    match cursor {
        None => Ok(1),
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|page| *page >= 1)
            .ok_or_else(|| PageError::Decode(format!("invalid page cursor: {raw}"))),
    }
}

/// Epoch seconds to UTC timestamp
pub(crate) fn from_epoch(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

/// Inclusive upper bound for APIs whose range filters include the end instant
pub(crate) fn inclusive_end(filter: &DateChunk) -> DateTime<Utc> {
    filter.end() - chrono::Duration::seconds(1)
}

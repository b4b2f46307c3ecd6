//! Jira Cloud dialect
//!
//! Issues are listed through JQL search with offset pagination. Credentials are
//! `email:api_token` pairs sent as basic auth; a secret without a colon is sent
//! as a bearer personal access token.
//!
//! JQL dates have minute precision and no offset:
//! - chunk edges are truncated to the minute, so adjacent chunks stay contiguous
//!   but a range boundary with seconds moves to the start of its minute
//! - Jira reads the values in the profile timezone of the authenticated user;
//!   set that profile to UTC for chunk edges to line up with UTC days

use serde_json::Value;

use super::dialect::{parse_json, Auth, Dialect, PageRequest, RawResponse};
use super::endpoint::EndpointSpec;
use super::{FetchResult, PageError};
use crate::credential::{Credential, QuotaInfo};
use crate::split::DateChunk;

/// Jira REST API dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct JiraDialect;

fn offset(cursor: Option<&str>) -> Result<u64, PageError> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| PageError::Decode(format!("invalid offset cursor: {raw}"))),
    }
}

/// JQL date literal; minute precision, read by Jira in the user's timezone
const JQL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn jql(endpoint: &EndpointSpec, filter: &DateChunk) -> String {
    format!(
        "project = \"{}\" AND created >= \"{}\" AND created < \"{}\" ORDER BY created ASC",
        endpoint.scope.replace('"', "\\\""),
        filter.start().format(JQL_DATE_FORMAT),
        filter.end().format(JQL_DATE_FORMAT),
    )
}

impl Dialect for JiraDialect {
    fn build_request(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<PageRequest, PageError> {
        let start_at = offset(cursor)?;
        let auth = match credential.secret().split_once(':') {
            Some((user, password)) => Auth::Basic {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => Auth::Header {
                name: "Authorization".to_string(),
                value: format!("Bearer {}", credential.secret()),
            },
        };

        Ok(PageRequest {
            path: endpoint.path.clone(),
            query: vec![
                ("jql".to_string(), jql(endpoint, filter)),
                ("startAt".to_string(), start_at.to_string()),
                ("maxResults".to_string(), endpoint.page_size.to_string()),
            ],
            auth,
        })
    }

    fn quota(&self, response: &RawResponse) -> QuotaInfo {
        QuotaInfo {
            remaining: response.header_i64("x-ratelimit-remaining"),
            reset_at: None,
        }
    }

    fn parse_page(
        &self,
        _endpoint: &EndpointSpec,
        cursor: Option<&str>,
        response: &RawResponse,
    ) -> Result<FetchResult, PageError> {
        let start_at = offset(cursor)?;
        let mut body = parse_json(&response.body)?;

        let items = match body.get_mut("issues").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(PageError::Decode("search response has no 'issues' array".to_string())),
        };
        let total = body.get("total").and_then(Value::as_u64);

        let consumed = start_at + items.len() as u64;
        let has_next = !items.is_empty() && total.map_or(false, |total| consumed < total);

        Ok(FetchResult {
            next_cursor: has_next.then(|| consumed.to_string()),
            items,
            quota: self.quota(response),
            min_delay: None,
        })
    }
}

//! GitHub REST dialect
//!
//! Issues and pull requests come from the search API, commits and branches
//! from the repository endpoints. Pagination is page-number based; a `Link`
//! header with `rel="next"` is authoritative when present, otherwise a full page
//! implies another one.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::dialect::{from_epoch, inclusive_end, page_number, parse_json, Auth, Dialect, PageRequest, RawResponse};
use super::endpoint::EndpointSpec;
use super::{FetchResult, PageError};
use crate::credential::{Credential, QuotaInfo};
use crate::split::DateChunk;
use crate::EntityKind;

/// GitHub API base URL
pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// GitHub REST API dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubDialect;

fn search_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl Dialect for GitHubDialect {
    fn build_request(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<PageRequest, PageError> {
        let page = page_number(cursor)?;
        let mut query = Vec::new();

        match endpoint.kind {
            EntityKind::Issue | EntityKind::PullRequest => {
                let qualifier = if endpoint.kind == EntityKind::Issue {
                    "is:issue"
                } else {
                    "is:pr"
                };
                query.push((
                    "q".to_string(),
                    format!(
                        "repo:{} {} created:{}..{}",
                        endpoint.scope,
                        qualifier,
                        search_timestamp(filter.start()),
                        search_timestamp(inclusive_end(filter)),
                    ),
                ));
                query.push(("sort".to_string(), "created".to_string()));
                query.push(("order".to_string(), "asc".to_string()));
            }
            EntityKind::Commit => {
                query.push(("since".to_string(), search_timestamp(filter.start())));
                query.push(("until".to_string(), search_timestamp(inclusive_end(filter))));
            }
            _ => {}
        }

        query.push(("per_page".to_string(), endpoint.page_size.to_string()));
        query.push(("page".to_string(), page.to_string()));

        Ok(PageRequest {
            path: endpoint.path.clone(),
            query,
            auth: Auth::Header {
                name: "Authorization".to_string(),
                value: format!("token {}", credential.secret()),
            },
        })
    }

    fn quota(&self, response: &RawResponse) -> QuotaInfo {
        QuotaInfo {
            remaining: response.header_i64("x-ratelimit-remaining"),
            reset_at: response.header_i64("x-ratelimit-reset").and_then(from_epoch),
        }
    }

    fn parse_page(
        &self,
        endpoint: &EndpointSpec,
        cursor: Option<&str>,
        response: &RawResponse,
    ) -> Result<FetchResult, PageError> {
        let page = page_number(cursor)?;
        let body = parse_json(&response.body)?;

        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(PageError::Decode(
                        "search response has no 'items' array".to_string(),
                    ))
                }
            },
            _ => return Err(PageError::Decode("unexpected response shape".to_string())),
        };

        let has_next = match response.header("link") {
            Some(link) => link.contains("rel=\"next\""),
            None => items.len() as u32 >= endpoint.page_size,
        };

        Ok(FetchResult {
            next_cursor: (has_next && !items.is_empty()).then(|| (page + 1).to_string()),
            items,
            quota: self.quota(response),
            min_delay: None,
        })
    }
}

//! List endpoints per (platform, entity kind)
//!
//! An [`EndpointSpec`] is resolved once when a job is built, so the fetch loop
//! stays generic and never branches on entity kind.

use serde::{Deserialize, Serialize};

use crate::harvester::config::{DEFAULT_QUOTA_SAFETY_THRESHOLD, SEARCH_QUOTA_SAFETY_THRESHOLD};
use crate::{EntityKind, Platform};

/// Items requested per page on every supported platform
pub const PAGE_SIZE: u32 = 100;

/// How the next page is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaginationStyle {
    /// 1-based page number (`page=N`)
    PageNumber,
    /// Item offset (`startAt=N`)
    Offset,
}

/// Fully resolved list endpoint for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Platform the endpoint belongs to
    pub platform: Platform,
    /// Entity kind it lists
    pub kind: EntityKind,
    /// Repository, project key or site
    pub scope: String,
    /// Request path relative to the platform base URL
    pub path: String,
    /// Whether the endpoint accepts a date-range filter
    pub dated: bool,
    /// Items per page
    pub page_size: u32,
    /// Pagination addressing
    pub pagination: PaginationStyle,
    /// Remaining quota below which a successful page triggers credential rotation
    ///
    /// Sized to the limit bucket the endpoint draws from: GitHub search has its
    /// own 30 requests per minute, far below the core hourly limit.
    pub quota_threshold: i64,
}

impl EndpointSpec {
    /// Resolve the list endpoint for `kind` on `platform`
    ///
    /// # Errors
    /// Returns a message when the platform cannot list that entity kind or the scope is blank.
    pub fn resolve(platform: Platform, kind: EntityKind, scope: &str) -> Result<Self, String> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err("scope must not be empty".to_string());
        }
        if !platform.supports(kind) {
            return Err(format!("{platform} does not support entity kind {kind}"));
        }
        if platform == Platform::GitHub && !is_owner_repo(scope) {
            return Err(format!(
                "GitHub scope must be 'owner/repo', got '{scope}'"
            ));
        }

        let (path, dated, pagination) = match (platform, kind) {
            (Platform::GitHub, EntityKind::Issue | EntityKind::PullRequest) => {
                ("/search/issues".to_string(), true, PaginationStyle::PageNumber)
            }
            (Platform::GitHub, EntityKind::Commit) => (
                format!("/repos/{scope}/commits"),
                true,
                PaginationStyle::PageNumber,
            ),
            (Platform::GitHub, EntityKind::Branch) => (
                format!("/repos/{scope}/branches"),
                false,
                PaginationStyle::PageNumber,
            ),
            (Platform::Jira, _) => ("/rest/api/3/search".to_string(), true, PaginationStyle::Offset),
            (Platform::StackExchange, EntityKind::Answer) => {
                ("/2.3/answers".to_string(), true, PaginationStyle::PageNumber)
            }
            (Platform::StackExchange, _) => {
                ("/2.3/questions".to_string(), true, PaginationStyle::PageNumber)
            }
            (Platform::GitHub, _) => {
                return Err(format!("{platform} does not support entity kind {kind}"))
            }
        };

        let quota_threshold = if path.starts_with("/search/") {
            SEARCH_QUOTA_SAFETY_THRESHOLD
        } else {
            DEFAULT_QUOTA_SAFETY_THRESHOLD
        };

        Ok(Self {
            platform,
            kind,
            scope: scope.to_string(),
            path,
            dated,
            page_size: PAGE_SIZE,
            pagination,
            quota_threshold,
        })
    }
}

fn is_owner_repo(scope: &str) -> bool {
    let mut parts = scope.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
    )
}

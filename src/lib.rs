//! # Activity Harvester Library
//!
//! A resilient engine for mining historical developer activity (commits, issues,
//! pull requests, branches, questions, answers) from rate-limited platform APIs
//! over multi-year date ranges.
//!
//! ## Features
//!
//! - **Multi-Platform Support**: GitHub, Jira and Stack Exchange list endpoints
//! - **Chunked Harvesting**: Long ranges are split into calendar-day chunks
//! - **Credential Rotation**: A pool of tokens with per-credential quota tracking
//! - **Backoff**: Capped exponential backoff with jitter for transient failures
//! - **Resume Capability**: Completed chunks are recorded and never fetched twice
//! - **Bounded Concurrency**: Chunks of one job run on a bounded worker pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use activity_harvester::credential::{Credential, CredentialPool};
//! use activity_harvester::fetcher::{http::HttpPageSource, PagedFetcher};
//! use activity_harvester::harvester::{HarvestJob, Harvester};
//! use activity_harvester::progress::{MemoryProgressStore, ProgressTracker};
//! use activity_harvester::sink::MemorySink;
//! use activity_harvester::split::DateRange;
//! use activity_harvester::{BackoffPolicy, EntityKind, Platform};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = DateRange::parse("2024-01-01", "2024-01-31")?;
//! let job = HarvestJob::new(Platform::GitHub, EntityKind::Issue, "rust-lang/rust", range, 1)?;
//!
//! let pool = Arc::new(CredentialPool::new(vec![Credential::new("ghp_token")])?);
//! let source = Arc::new(HttpPageSource::new(Platform::GitHub)?);
//! let fetcher = PagedFetcher::new(source, pool, BackoffPolicy::default());
//!
//! let harvester = Harvester::new(
//!     fetcher,
//!     ProgressTracker::new(Arc::new(MemoryProgressStore::new())),
//!     Arc::new(MemorySink::new()),
//! );
//! let report = harvester.run(&job).await?;
//! println!("{}", report.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`credential`] - Credential pool with quota tracking and round-robin selection
//! - [`backoff`] - Pure retry decision function
//! - [`split`] - Half-open date ranges and calendar-day chunking
//! - [`fetcher`] - Paged fetching over a platform-specific page source
//! - [`progress`] - Per-chunk completion records (memory and file backed)
//! - [`sink`] - Output sinks receiving one batch per completed chunk
//! - [`harvester`] - Orchestration: chunking, skipping, worker pool, job report
//! - [`shutdown`] - Cancellation signal shared across workers

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Retry decisions with capped exponential backoff
pub mod backoff;

/// CLI command implementations
pub mod cli;

/// Credential pool and quota tracking
pub mod credential;

/// Paged fetching against platform APIs
pub mod fetcher;

/// Harvest orchestration
pub mod harvester;

/// Observability metrics
pub mod metrics;

/// Chunk completion tracking
pub mod progress;

/// Graceful cancellation shared across workers
pub mod shutdown;

/// Output sinks for harvested records
pub mod sink;

/// Date ranges and chunk splitting
pub mod split;

pub use backoff::{BackoffPolicy, ErrorClass, RetryDecision};

/// Developer platform a job harvests from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// GitHub REST API
    GitHub,
    /// Jira Cloud REST API
    Jira,
    /// Stack Exchange API
    StackExchange,
}

impl Platform {
    /// Entity kinds this platform can list by date range
    pub fn supported_kinds(&self) -> &'static [EntityKind] {
        match self {
            Platform::GitHub => &[
                EntityKind::Commit,
                EntityKind::Issue,
                EntityKind::PullRequest,
                EntityKind::Branch,
            ],
            Platform::Jira => &[EntityKind::Issue],
            Platform::StackExchange => &[EntityKind::Question, EntityKind::Answer],
        }
    }

    /// Whether `kind` can be harvested from this platform
    pub fn supports(&self, kind: EntityKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    /// Environment variable holding comma separated credentials for this platform
    pub fn credentials_env_var(&self) -> &'static str {
        match self {
            Platform::GitHub => "GITHUB_TOKENS",
            Platform::Jira => "JIRA_API_TOKENS",
            Platform::StackExchange => "STACK_TOKENS",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::GitHub => "github",
            Platform::Jira => "jira",
            Platform::StackExchange => "stackexchange",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" | "gh" => Ok(Platform::GitHub),
            "jira" => Ok(Platform::Jira),
            "stackexchange" | "stackoverflow" | "stack" => Ok(Platform::StackExchange),
            _ => Err(format!(
                "Invalid platform: {s}. Valid options: github, jira, stackexchange"
            )),
        }
    }
}

/// Kind of activity record being harvested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Repository commits
    Commit,
    /// Issues (GitHub issues, Jira issues)
    Issue,
    /// Pull requests
    PullRequest,
    /// Repository branches
    Branch,
    /// Stack Exchange questions
    Question,
    /// Stack Exchange answers
    Answer,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Commit => "commit",
            EntityKind::Issue => "issue",
            EntityKind::PullRequest => "pull_request",
            EntityKind::Branch => "branch",
            EntityKind::Question => "question",
            EntityKind::Answer => "answer",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "commit" | "commits" => Ok(EntityKind::Commit),
            "issue" | "issues" => Ok(EntityKind::Issue),
            "pull_request" | "pull_requests" | "pr" | "prs" => Ok(EntityKind::PullRequest),
            "branch" | "branches" => Ok(EntityKind::Branch),
            "question" | "questions" => Ok(EntityKind::Question),
            "answer" | "answers" => Ok(EntityKind::Answer),
            _ => Err(format!("Invalid entity kind: {s}")),
        }
    }
}

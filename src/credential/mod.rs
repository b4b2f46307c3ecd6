//! Credentials and the quota-aware credential pool
//!
//! A [`Credential`] pairs an opaque secret with the last quota information the
//! platform reported for it. Credentials are created once from configuration and
//! handed to a [`CredentialPool`], which owns all mutable quota state from then on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod pool;

pub use pool::{Acquire, CredentialPool};

/// Remaining quota value meaning "not probed yet"
pub const UNKNOWN_QUOTA: i64 = -1;

/// Quota metadata extracted from a response
///
/// Either side may be absent when the platform did not advertise it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Calls left before the credential is throttled
    pub remaining: Option<i64>,
    /// When the quota is replenished
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaInfo {
    /// Quota info with both fields known
    pub fn new(remaining: i64, reset_at: DateTime<Utc>) -> Self {
        Self {
            remaining: Some(remaining),
            reset_at: Some(reset_at),
        }
    }

    /// Whether nothing was advertised
    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.reset_at.is_none()
    }
}

/// Errors building a credential pool
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// No credentials were configured
    #[error("credential pool requires at least one credential")]
    Empty,

    /// A configured secret was blank
    #[error("credential {0} has an empty secret")]
    BlankSecret(usize),
}

/// One API credential and its last known quota
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub(crate) slot: usize,
    identifier: String,
    secret: String,
    remaining_quota: i64,
    reset_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Credential with unknown quota, identified by a masked form of its secret
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self::labeled(mask_secret(&secret), secret)
    }

    /// Credential with an explicit identifier
    pub fn labeled(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            slot: 0,
            identifier: identifier.into(),
            secret: secret.into(),
            remaining_quota: UNKNOWN_QUOTA,
            reset_at: None,
        }
    }

    /// Seed a known quota (for credentials probed before the pool is built)
    pub fn with_quota(mut self, remaining: i64, reset_at: Option<DateTime<Utc>>) -> Self {
        self.remaining_quota = remaining;
        self.reset_at = reset_at;
        self
    }

    /// Identifier safe to log
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Raw secret for the transport layer
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Last known remaining quota, [`UNKNOWN_QUOTA`] until first report
    pub fn remaining_quota(&self) -> i64 {
        self.remaining_quota
    }

    /// When the quota replenishes, if known
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    /// Whether the credential may be used at `now`
    ///
    /// Unknown or positive quota is usable. An exhausted credential becomes
    /// usable again once its reset time has passed.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        if self.remaining_quota != 0 {
            return true;
        }
        matches!(self.reset_at, Some(reset) if reset <= now)
    }

    pub(crate) fn apply(&mut self, quota: QuotaInfo) {
        if let Some(remaining) = quota.remaining {
            self.remaining_quota = remaining.max(0);
        }
        if let Some(reset_at) = quota.reset_at {
            self.reset_at = Some(reset_at);
        }
    }

    pub(crate) fn revive_if_reset(&mut self, now: DateTime<Utc>) {
        if self.remaining_quota == 0 && matches!(self.reset_at, Some(reset) if reset <= now) {
            self.remaining_quota = UNKNOWN_QUOTA;
            self.reset_at = None;
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .field("remaining_quota", &self.remaining_quota)
            .field("reset_at", &self.reset_at)
            .finish()
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

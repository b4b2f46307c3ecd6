//! Round-robin credential pool with per-credential quota tracking
//!
//! All quota state lives behind one mutex; every read-modify-write of a
//! credential's counters happens while it is held, and it is never held
//! across an `.await`.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{Credential, PoolError, QuotaInfo};
use crate::harvester::config::DEFAULT_RESET_FALLBACK;
use crate::metrics::{record_credential_switch, record_pool_blocked};
use crate::shutdown::CancelSignal;

/// Result of [`CredentialPool::acquire`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// A usable credential (snapshot of its state at selection time)
    Ready(Credential),
    /// Every credential is exhausted; the earliest replenish time across the pool
    Blocked {
        /// Minimum `reset_at` over all members
        reset_at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct PoolState {
    members: Vec<Credential>,
    cursor: usize,
}

/// Shared pool of credentials for one platform
#[derive(Debug)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Build a pool; members are ordered by identifier so ties resolve deterministically
    pub fn new(credentials: Vec<Credential>) -> Result<Self, PoolError> {
        if credentials.is_empty() {
            return Err(PoolError::Empty);
        }
        if let Some(index) = credentials.iter().position(|c| c.secret().trim().is_empty()) {
            return Err(PoolError::BlankSecret(index));
        }

        let mut members = credentials;
        members.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        for (slot, member) in members.iter_mut().enumerate() {
            member.slot = slot;
        }

        info!(credentials = members.len(), "Credential pool initialized");
        Ok(Self {
            state: Mutex::new(PoolState { members, cursor: 0 }),
        })
    }

    /// Build a pool from raw secrets
    pub fn from_secrets<I, S>(secrets: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(secrets.into_iter().map(Credential::new).collect())
    }

    /// Number of credentials in the pool
    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    /// Always false; an empty pool cannot be built
    pub fn is_empty(&self) -> bool {
        self.lock().members.is_empty()
    }

    /// Snapshot of every member's current state
    pub fn snapshot(&self) -> Vec<Credential> {
        self.lock().members.clone()
    }

    /// Select the next usable credential (round-robin)
    pub fn acquire(&self) -> Acquire {
        self.acquire_at(Utc::now())
    }

    /// [`Self::acquire`] evaluated at an explicit instant
    pub fn acquire_at(&self, now: DateTime<Utc>) -> Acquire {
        let mut state = self.lock();
        let len = state.members.len();

        for offset in 0..len {
            let slot = (state.cursor + offset) % len;
            let member = &mut state.members[slot];
            member.revive_if_reset(now);
            if member.is_usable_at(now) {
                let selected = member.clone();
                state.cursor = (slot + 1) % len;
                return Acquire::Ready(selected);
            }
        }

        let reset_at = state
            .members
            .iter()
            .filter_map(Credential::reset_at)
            .min()
            .unwrap_or_else(|| now + fallback_delay());
        Acquire::Blocked { reset_at }
    }

    /// Select a usable credential other than `current`
    ///
    /// Returns `None` when `current` is the only usable member.
    pub fn acquire_other(&self, current: &Credential) -> Option<Credential> {
        self.acquire_other_at(current, Utc::now())
    }

    /// [`Self::acquire_other`] evaluated at an explicit instant
    pub fn acquire_other_at(&self, current: &Credential, now: DateTime<Utc>) -> Option<Credential> {
        let mut state = self.lock();
        let len = state.members.len();

        for offset in 0..len {
            let slot = (state.cursor + offset) % len;
            if slot == current.slot {
                continue;
            }
            let member = &mut state.members[slot];
            member.revive_if_reset(now);
            if member.is_usable_at(now) {
                let selected = member.clone();
                state.cursor = (slot + 1) % len;
                record_credential_switch();
                debug!(
                    from = %current.identifier(),
                    to = %selected.identifier(),
                    "Rotated credential"
                );
                return Some(selected);
            }
        }
        None
    }

    /// Record quota metadata from a response made with `credential`
    ///
    /// A credential reported at zero remaining quota without a reset time is
    /// assumed to replenish after a fixed fallback delay.
    pub fn report(&self, credential: &Credential, quota: QuotaInfo) {
        let mut state = self.lock();
        let Some(member) = state.members.get_mut(credential.slot) else {
            return;
        };
        member.apply(quota);
        if member.remaining_quota() == 0 && member.reset_at().is_none() {
            member.reset_at = Some(Utc::now() + fallback_delay());
        }
        if member.remaining_quota() == 0 {
            warn!(
                credential = %member.identifier(),
                reset_at = ?member.reset_at(),
                "Credential exhausted"
            );
        }
    }

    /// Mark `credential` unusable until `reset_at`
    pub fn mark_exhausted(&self, credential: &Credential, reset_at: DateTime<Utc>) {
        self.report(
            credential,
            QuotaInfo {
                remaining: Some(0),
                reset_at: Some(reset_at),
            },
        );
    }

    /// Acquire a credential, sleeping until the earliest reset while the pool is blocked
    ///
    /// Returns `None` if `cancel` fires while waiting.
    pub async fn acquire_or_wait(&self, cancel: &CancelSignal) -> Option<Credential> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.acquire() {
                Acquire::Ready(credential) => return Some(credential),
                Acquire::Blocked { reset_at } => {
                    let wait = (reset_at - Utc::now())
                        .to_std()
                        .unwrap_or_default()
                        .max(std::time::Duration::from_millis(10));
                    record_pool_blocked(wait);
                    warn!(
                        wait_secs = wait.as_secs(),
                        reset_at = %reset_at,
                        "All credentials exhausted, waiting for quota reset"
                    );
                    if !cancel.sleep(wait).await {
                        return None;
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn fallback_delay() -> chrono::Duration {
    chrono::Duration::from_std(DEFAULT_RESET_FALLBACK).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

//! In-process session store.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use quire_common::Purpose;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{SessionStore, StoredChallenge};

/// Entries beyond this trigger a purge of expired challenges
const PURGE_THRESHOLD: usize = 10_000;

/// Minimum seconds between two purges
const PURGE_INTERVAL_SECS: i64 = 60;

/// Session store backed by a concurrent map.
///
/// Each `(session, purpose)` slot is updated through the map's per-shard
/// locking, so concurrent requests for one session never lose a write.
pub struct MemorySessionStore {
    challenges: DashMap<(String, Purpose), StoredChallenge>,
    purge_threshold: usize,
    /// Unix time of the last purge
    last_purge: AtomicI64,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_purge_threshold(PURGE_THRESHOLD)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purge_threshold(purge_threshold: usize) -> Self {
        Self {
            challenges: DashMap::new(),
            purge_threshold,
            last_purge: AtomicI64::new(i64::MIN),
        }
    }

    /// Number of live slots (expired ones included until purged)
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    /// Drop every expired challenge
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.challenges.len();
        self.challenges.retain(|_, challenge| !challenge.is_expired(now));
        before - self.challenges.len()
    }

    /// Purge when over the threshold, at most once per interval.
    /// Returns the number purged, or `None` if no purge ran.
    fn maybe_purge(&self, now: i64) -> Option<usize> {
        if self.len() < self.purge_threshold {
            return None;
        }
        let last = self.last_purge.load(Ordering::Relaxed);
        if now.saturating_sub(last) < PURGE_INTERVAL_SECS {
            return None;
        }
        // Only the caller that wins the swap purges
        self.last_purge
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .ok()?;
        Some(self.purge_expired(now))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
        challenge: StoredChallenge,
        _ttl_secs: u64,
    ) -> Result<()> {
        if let Some(purged) = self.maybe_purge(chrono::Utc::now().timestamp()) {
            tracing::debug!(purged, "Purged expired in-memory challenges");
        }

        self.challenges
            .insert((session_id.to_string(), purpose), challenge);
        Ok(())
    }

    async fn take_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
    ) -> Result<Option<StoredChallenge>> {
        Ok(self
            .challenges
            .remove(&(session_id.to_string(), purpose))
            .map(|(_, challenge)| challenge))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

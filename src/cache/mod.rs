//! TTL cache of definitive check results.
//!
//! Entries are keyed by a digest of the check spec, expire after a TTL, and
//! are dropped early when a completion event matches one of their
//! `invalidated_by` matchers. Storage and time are injected so the cache is
//! testable without a filesystem.
use crate::clock::Clock;
use crate::dispatch::CompletionEvent;
use crate::outcome::Outcome;
use crate::registry::{CheckSpec, EventMatcher, ScenarioDef};
use crate::util::sha256_hex;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

mod store;

pub use store::{CacheEntry, CacheStore, FileStore};
#[cfg(test)]
pub use store::MemoryStore;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct KeyMaterial<'a> {
    check: &'a CheckSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<&'a ScenarioDef>,
}

/// Digest of the canonical JSON of a check spec (and its scenario body).
pub fn cache_key(check: &CheckSpec, scenario: Option<&ScenarioDef>) -> Result<String> {
    let bytes = serde_json::to_vec(&KeyMaterial { check, scenario })
        .context("serialize check spec for cache key")?;
    Ok(sha256_hex(&bytes))
}

pub struct ResultCache<S: CacheStore, C: Clock> {
    store: S,
    clock: C,
    entries: BTreeMap<String, CacheEntry>,
    /// Writes since the last flush; `None` marks a removal.
    pending: BTreeMap<String, Option<CacheEntry>>,
}

impl<S: CacheStore, C: Clock> ResultCache<S, C> {
    /// Load entries from the store. An unreadable store starts empty.
    pub fn open(store: S, clock: C) -> Self {
        let entries = match store.load() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("cache unreadable; starting empty: {err:#}");
                BTreeMap::new()
            }
        };
        Self {
            store,
            clock,
            entries,
            pending: BTreeMap::new(),
        }
    }

    /// Unexpired outcome for a key.
    pub fn get(&self, key: &str) -> Result<Option<Outcome>> {
        let now = self.clock.now_epoch_ms()?;
        Ok(self
            .entries
            .get(key)
            .filter(|entry| now < entry.expires_at_epoch_ms)
            .map(|entry| entry.outcome.clone()))
    }

    /// Store a definitive outcome; returns false for outcomes that are not cached.
    pub fn put(
        &mut self,
        key: &str,
        outcome: &Outcome,
        ttl: Duration,
        invalidated_by: &[EventMatcher],
    ) -> Result<bool> {
        if !outcome.is_definitive() {
            return Ok(false);
        }
        let now = self.clock.now_epoch_ms()?;
        let entry = CacheEntry {
            outcome: outcome.clone(),
            stored_at_epoch_ms: now,
            expires_at_epoch_ms: now + ttl.as_millis(),
            invalidated_by: invalidated_by.to_vec(),
        };
        self.entries.insert(key.to_string(), entry.clone());
        self.pending.insert(key.to_string(), Some(entry));
        Ok(true)
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.pending.insert(key.to_string(), None);
        }
        removed
    }

    fn remove_where(&mut self, stale: impl Fn(&CacheEntry) -> bool) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| stale(entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
            self.pending.insert(key.clone(), None);
        }
        keys.len()
    }

    /// Drop every entry whose matchers accept a successful event.
    pub fn invalidate_for_event(&mut self, event: &CompletionEvent) -> usize {
        if !event.succeeded() {
            return 0;
        }
        let removed = self.remove_where(|entry| {
            entry
                .invalidated_by
                .iter()
                .any(|matcher| event.matches(matcher))
        });
        if removed > 0 {
            tracing::info!(removed, command = %event.command_name, "cache entries invalidated");
        }
        removed
    }

    pub fn purge_expired(&mut self) -> Result<usize> {
        let now = self.clock.now_epoch_ms()?;
        Ok(self.remove_where(|entry| now >= entry.expires_at_epoch_ms))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay pending writes onto the store's current contents and save.
    ///
    /// Another process (an inbound event during a run) may have changed the
    /// store since `open`; only keys this cache touched are overwritten.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut merged = match self.store.load() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("cache unreadable at flush; rewriting: {err:#}");
                BTreeMap::new()
            }
        };
        for (key, change) in std::mem::take(&mut self.pending) {
            match change {
                Some(entry) => merged.insert(key, entry),
                None => merged.remove(&key),
            };
        }
        self.store.save(&merged)?;
        self.entries = merged;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }
}

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::task::{ImageArtifact, ImageTask};

use super::{ArtifactCache, CacheBackendKind, CacheEntry};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Minimum time between two eviction sweeps.
    pub clean_interval_seconds: f32,
    /// Ready artifacts untouched for this long are evicted.
    pub keep_unused_seconds: f32,
    pub max_ready_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            clean_interval_seconds: 5.0,
            keep_unused_seconds: 120.0,
            max_ready_entries: 512,
        }
    }
}

impl MemoryCacheConfig {
    fn clean_interval(&self) -> Duration {
        seconds_or(self.clean_interval_seconds, 5.0)
    }

    fn keep_unused(&self) -> Duration {
        seconds_or(self.keep_unused_seconds, 120.0)
    }
}

fn seconds_or(value: f32, fallback: f32) -> Duration {
    if value.is_finite() && value >= 0.0 {
        Duration::from_secs_f32(value)
    } else {
        Duration::from_secs_f32(fallback)
    }
}

#[derive(Debug)]
struct MemoryEntry {
    entry: CacheEntry,
    last_access: Duration,
}

/// In-process cache with a throttled eviction sweep.
///
/// Time is the sum of the deltas passed to `maintain`, so the sweep follows
/// the host's tick clock rather than wall time.
#[derive(Debug)]
pub struct MemoryCache {
    config: MemoryCacheConfig,
    entries: HashMap<Fingerprint, MemoryEntry>,
    clock: Duration,
    since_clean: Duration,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            clock: Duration::ZERO,
            since_clean: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| matches!(entry.entry, CacheEntry::Pending(_)))
            .count()
    }

    pub fn ready_len(&self) -> usize {
        self.entries.len() - self.pending_len()
    }

    fn sweep(&mut self) {
        let before = self.entries.len();
        let clock = self.clock;
        let keep_unused = self.config.keep_unused();
        self.entries.retain(|_, entry| match entry.entry {
            CacheEntry::Pending(_) => true,
            CacheEntry::Ready(_) => clock.saturating_sub(entry.last_access) <= keep_unused,
        });

        let mut ready = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry.entry, CacheEntry::Ready(_)))
            .map(|(fingerprint, entry)| (entry.last_access, *fingerprint))
            .collect::<Vec<_>>();
        if ready.len() > self.config.max_ready_entries {
            ready.sort_unstable();
            let excess = ready.len() - self.config.max_ready_entries;
            for (_, fingerprint) in ready.into_iter().take(excess) {
                self.entries.remove(&fingerprint);
            }
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.entries.len(),
                "photo_memory_cache_swept"
            );
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl ArtifactCache for MemoryCache {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Memory
    }

    fn get(&mut self, fingerprint: Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.get_mut(&fingerprint)?;
        entry.last_access = self.clock;
        Some(entry.entry.clone())
    }

    fn insert_pending(&mut self, fingerprint: Fingerprint, task: ImageTask) {
        self.entries.insert(
            fingerprint,
            MemoryEntry {
                entry: CacheEntry::Pending(task),
                last_access: self.clock,
            },
        );
    }

    fn complete(&mut self, fingerprint: Fingerprint, artifact: &ImageArtifact) {
        self.entries.insert(
            fingerprint,
            MemoryEntry {
                entry: CacheEntry::Ready(artifact.clone()),
                last_access: self.clock,
            },
        );
    }

    fn forget(&mut self, fingerprint: Fingerprint) {
        self.entries.remove(&fingerprint);
    }

    fn drain_pending(&mut self) -> Vec<(Fingerprint, ImageTask)> {
        let pending = self
            .entries
            .iter()
            .filter_map(|(fingerprint, entry)| match &entry.entry {
                CacheEntry::Pending(task) => Some((*fingerprint, task.clone())),
                CacheEntry::Ready(_) => None,
            })
            .collect::<Vec<_>>();
        for (fingerprint, _) in &pending {
            self.entries.remove(fingerprint);
        }
        pending
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn maintain(&mut self, delta: Duration) {
        self.clock = self.clock.saturating_add(delta);
        self.since_clean = self.since_clean.saturating_add(delta);
        if self.since_clean < self.config.clean_interval() {
            return;
        }
        self.since_clean = Duration::ZERO;
        self.sweep();
    }
}

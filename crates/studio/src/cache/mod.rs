mod disk;
mod memory;
mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::task::{ImageArtifact, ImageTask};

pub use disk::DiskCache;
pub use memory::{MemoryCache, MemoryCacheConfig};
pub use store::{photo_cache_dir, write_bytes_atomic, ArtifactStore, DirectoryStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Requested but not rendered yet; new requests attach to this task.
    Pending(ImageTask),
    Ready(ImageArtifact),
}

/// Fingerprint-keyed store of finished and in-flight photographs.
pub trait ArtifactCache {
    fn kind(&self) -> CacheBackendKind;

    fn get(&mut self, fingerprint: Fingerprint) -> Option<CacheEntry>;

    fn insert_pending(&mut self, fingerprint: Fingerprint, task: ImageTask);

    /// Turns a pending entry into a ready one.
    fn complete(&mut self, fingerprint: Fingerprint, artifact: &ImageArtifact);

    /// Drops whatever is stored for `fingerprint`. Used when a job fails.
    fn forget(&mut self, fingerprint: Fingerprint);

    /// Removes and returns every pending entry.
    fn drain_pending(&mut self) -> Vec<(Fingerprint, ImageTask)>;

    fn clear(&mut self);

    /// Called every idle tick with the time since the previous call.
    fn maintain(&mut self, _delta: Duration) {}
}

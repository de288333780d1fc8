use std::collections::HashMap;
use std::io::Cursor;

use image::ImageFormat;
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::task::{ImageArtifact, ImageTask};

use super::store::ArtifactStore;
use super::{ArtifactCache, CacheBackendKind, CacheEntry};

/// Durable cache tier. In-flight jobs stay in memory; finished artifacts are
/// encoded as PNG and handed to the store.
pub struct DiskCache {
    store: Box<dyn ArtifactStore>,
    pending: HashMap<Fingerprint, ImageTask>,
}

impl DiskCache {
    pub fn new(store: Box<dyn ArtifactStore>) -> Self {
        Self {
            store,
            pending: HashMap::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn load(&self, fingerprint: Fingerprint) -> Option<ImageArtifact> {
        let bytes = match self.store.get(fingerprint) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                warn!(fingerprint = %fingerprint, error = %error, "photo_disk_cache_read_failed");
                return None;
            }
        };
        match image::load_from_memory_with_format(&bytes, ImageFormat::Png) {
            Ok(decoded) => Some(ImageArtifact::from_rgba(decoded.into_rgba8())),
            Err(error) => {
                warn!(fingerprint = %fingerprint, error = %error, "photo_disk_cache_entry_corrupt");
                None
            }
        }
    }
}

impl ArtifactCache for DiskCache {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Disk
    }

    fn get(&mut self, fingerprint: Fingerprint) -> Option<CacheEntry> {
        if let Some(task) = self.pending.get(&fingerprint) {
            return Some(CacheEntry::Pending(task.clone()));
        }
        self.load(fingerprint).map(CacheEntry::Ready)
    }

    fn insert_pending(&mut self, fingerprint: Fingerprint, task: ImageTask) {
        self.pending.insert(fingerprint, task);
    }

    fn complete(&mut self, fingerprint: Fingerprint, artifact: &ImageArtifact) {
        self.pending.remove(&fingerprint);

        let mut encoded = Cursor::new(Vec::new());
        if let Err(error) = artifact.image().write_to(&mut encoded, ImageFormat::Png) {
            warn!(fingerprint = %fingerprint, error = %error, "photo_disk_cache_encode_failed");
            return;
        }
        let bytes = encoded.into_inner();
        match self.store.put(fingerprint, &bytes) {
            Ok(()) => debug!(fingerprint = %fingerprint, bytes = bytes.len(), "photo_disk_cache_written"),
            Err(error) => {
                warn!(fingerprint = %fingerprint, error = %error, "photo_disk_cache_write_failed")
            }
        }
    }

    fn forget(&mut self, fingerprint: Fingerprint) {
        self.pending.remove(&fingerprint);
    }

    fn drain_pending(&mut self) -> Vec<(Fingerprint, ImageTask)> {
        self.pending.drain().collect()
    }

    /// Only drops in-memory bookkeeping; files on disk are kept.
    fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    use super::*;
    use crate::cache::store::{DirectoryStore, StoreError};
    use crate::subject::Subject;
    use crate::testing::TestSceneSubject;

    struct BrokenStore;

    impl ArtifactStore for BrokenStore {
        fn get(&self, _fingerprint: Fingerprint) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Read {
                path: "broken".into(),
                source: std::io::Error::other("disk unplugged"),
            })
        }

        fn put(&self, _fingerprint: Fingerprint, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Write {
                path: "broken".into(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    fn artifact() -> ImageArtifact {
        ImageArtifact::from_rgba(RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn completed_artifact_is_readable_after_reopen() {
        let temp = TempDir::new().expect("temp");
        let fingerprint = Fingerprint(0xfeed);
        {
            let store = DirectoryStore::open(temp.path()).expect("open");
            let mut cache = DiskCache::new(Box::new(store));
            cache.complete(fingerprint, &artifact());
        }

        let store = DirectoryStore::open(temp.path()).expect("reopen");
        let mut cache = DiskCache::new(Box::new(store));
        let Some(CacheEntry::Ready(loaded)) = cache.get(fingerprint) else {
            panic!("expected ready entry");
        };
        assert_eq!(loaded.dimensions(), (4, 2));
        assert_eq!(loaded.image().get_pixel(1, 1), &Rgba([10, 20, 30, 255]));
        assert_eq!(loaded.texture().mip_count(), 3);
    }

    #[test]
    fn pending_entries_shadow_the_store() {
        let temp = TempDir::new().expect("temp");
        let mut cache = DiskCache::new(Box::new(DirectoryStore::open(temp.path()).expect("open")));
        let subject = Subject::scene(TestSceneSubject::new("res://a.json", [0; 4]));
        let fingerprint = subject.fingerprint();
        let task = ImageTask::new(subject, 1, fingerprint);
        cache.insert_pending(fingerprint, task.clone());

        let Some(CacheEntry::Pending(found)) = cache.get(fingerprint) else {
            panic!("expected pending entry");
        };
        assert!(found.same_task(&task));

        cache.complete(fingerprint, &artifact());
        assert_eq!(cache.pending_len(), 0);
        assert!(matches!(cache.get(fingerprint), Some(CacheEntry::Ready(_))));
    }

    #[test]
    fn store_failures_are_misses_not_errors() {
        let mut cache = DiskCache::new(Box::new(BrokenStore));
        cache.complete(Fingerprint(1), &artifact());
        assert!(cache.get(Fingerprint(1)).is_none());
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let temp = TempDir::new().expect("temp");
        let store = DirectoryStore::open(temp.path()).expect("open");
        store.put(Fingerprint(5), b"not a png").expect("put");
        let mut cache = DiskCache::new(Box::new(store));
        assert!(cache.get(Fingerprint(5)).is_none());
    }
}

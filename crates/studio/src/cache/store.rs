use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fingerprint::Fingerprint;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create artifact store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Durable bytes keyed by fingerprint. Callers treat every error as a miss
/// (reads) or drop it (writes).
pub trait ArtifactStore {
    fn get(&self, fingerprint: Fingerprint) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, fingerprint: Fingerprint, bytes: &[u8]) -> Result<(), StoreError>;
}

pub fn photo_cache_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("photo_studio")
}

/// One PNG file per fingerprint inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, fingerprint: Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.png"))
    }
}

impl ArtifactStore for DirectoryStore {
    fn get(&self, fingerprint: Fingerprint) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(fingerprint);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    fn put(&self, fingerprint: Fingerprint, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(fingerprint);
        write_bytes_atomic(&path, bytes).map_err(|source| StoreError::Write { path, source })
    }
}

/// Writes `bytes` to `path` via a `<name>.tmp` sibling that is renamed into
/// place. Readers see either the old file or the complete new one.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    fs::write(&staging, bytes)
        .and_then(|()| fs::rename(&staging, path))
        .inspect_err(|_| {
            let _ = fs::remove_file(&staging);
        })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

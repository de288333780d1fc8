use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod pipeline;
mod queue;
pub mod render;
pub mod scene;
pub mod simulation;
pub mod subject;
pub mod task;
#[cfg(test)]
mod testing;

pub use cache::{
    photo_cache_dir, write_bytes_atomic, ArtifactCache, ArtifactStore, CacheBackendKind,
    CacheEntry, DirectoryStore, DiskCache, MemoryCache, MemoryCacheConfig, StoreError,
};
pub use config::{
    StudioConfig, BACKGROUND_INSTANCE_ENV_VAR, BACKGROUND_LOAD_ENV_VAR, DISK_CACHE_ENV_VAR,
};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use pipeline::{CacheSwitchError, PhotoStudio, Step, StepOutcome, StudioServices};
pub use render::{
    CameraPose, CaptureError, CaptureViewport, SoftwareViewport, StageView, UpdateMode,
};
pub use scene::{
    validate_resource_path, AssetError, JsonSceneLoader, NodeShape, ResourcePathError,
    SceneAsset, SceneLoader, SceneNode, Vec3, WorldShape, RESOURCE_SCHEME,
};
pub use simulation::{
    RegistryError, SimulationFactory, SimulationKind, SimulationSlot, WorldSimulation,
    WorldSimulationRegistry,
};
pub use subject::{
    camera_distance_from_radius, Photographable, ScenePhotographable, SimulationPhotographable,
    Subject, SubjectError, SubjectKind,
};
pub use task::{ImageArtifact, ImageTask, JobError, JobOutcome, Texture, DEFAULT_PRIORITY};

pub const ROOT_ENV_VAR: &str = "PHOTO_STUDIO_ROOT";

#[derive(Debug, Clone)]
pub struct StudioPaths {
    pub root: PathBuf,
    /// Directory `res://` scene paths resolve against.
    pub scenes_dir: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "PHOTO_STUDIO_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/photo-studio\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_studio_paths() -> Result<StudioPaths, StartupError> {
    studio_paths_from_root(resolve_root()?)
}

fn studio_paths_from_root(root: PathBuf) -> Result<StudioPaths, StartupError> {
    let scenes_dir = root.join("assets").join("scenes");
    let cache_dir = root.join("cache");

    fs::create_dir_all(&cache_dir).map_err(|source| StartupError::CreateCacheDir {
        path: cache_dir.clone(),
        source,
    })?;

    Ok(StudioPaths {
        root,
        scenes_dir,
        cache_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

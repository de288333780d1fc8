use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::resource_path::{validate_resource_path, ResourcePathError};
use super::SceneNode;

/// A loaded, not yet instantiated scene resource.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneAsset {
    pub path: String,
    pub root: SceneNode,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid scene path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: ResourcePathError,
    },
    #[error("failed to read scene file {file}: {source}")]
    Read {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("scene file {file} is not a valid scene description: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to instantiate scene {path}: {message}")]
    Instantiate { path: String, message: String },
}

/// Resolves scene paths to assets and turns assets into live nodes.
///
/// Called from background worker threads when the studio is configured to
/// offload loading, hence `Send + Sync`.
pub trait SceneLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<Arc<SceneAsset>, AssetError>;

    fn instantiate(&self, asset: &SceneAsset) -> Result<SceneNode, AssetError> {
        Ok(asset.root.clone())
    }
}

/// Reads `res://` scene descriptions stored as JSON under a root directory.
#[derive(Debug, Clone)]
pub struct JsonSceneLoader {
    root: PathBuf,
}

impl JsonSceneLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative =
            validate_resource_path(path).map_err(|source| AssetError::InvalidPath {
                path: path.to_string(),
                source,
            })?;
        Ok(relative
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment)))
    }
}

impl SceneLoader for JsonSceneLoader {
    fn load(&self, path: &str) -> Result<Arc<SceneAsset>, AssetError> {
        let file = self.resolve(path)?;
        let raw = fs::read_to_string(&file).map_err(|source| AssetError::Read {
            file: file.clone(),
            source,
        })?;
        let root = serde_json::from_str::<SceneNode>(&raw)
            .map_err(|source| AssetError::Parse { file, source })?;
        debug!(path, node_count = root.node_count(), "scene_asset_loaded");
        Ok(Arc::new(SceneAsset {
            path: path.to_string(),
            root,
        }))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn loads_scene_relative_to_root() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("demo")).expect("mkdir");
        fs::write(
            temp.path().join("demo").join("cube.tscn"),
            r#"{"name":"cube","shape":{"radius":1.0,"color":[200,40,40,255]}}"#,
        )
        .expect("write scene");

        let loader = JsonSceneLoader::new(temp.path());
        let asset = loader.load("res://demo/cube.tscn").expect("load");
        assert_eq!(asset.path, "res://demo/cube.tscn");
        assert_eq!(asset.root.name, "cube");

        let instance = loader.instantiate(&asset).expect("instantiate");
        assert_eq!(instance, asset.root);
    }

    #[test]
    fn missing_file_is_read_error() {
        let temp = TempDir::new().expect("temp");
        let loader = JsonSceneLoader::new(temp.path());
        let error = loader.load("res://missing.json").expect_err("error");
        assert!(matches!(error, AssetError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join("bad.json"), "{not json").expect("write");
        let loader = JsonSceneLoader::new(temp.path());
        let error = loader.load("res://bad.json").expect_err("error");
        assert!(matches!(error, AssetError::Parse { .. }));
    }

    #[test]
    fn traversal_is_rejected_before_touching_disk() {
        let loader = JsonSceneLoader::new("/nonexistent");
        let error = loader.load("res://../etc/passwd").expect_err("error");
        assert!(matches!(
            error,
            AssetError::InvalidPath {
                source: ResourcePathError::ParentTraversal,
                ..
            }
        ));
    }
}

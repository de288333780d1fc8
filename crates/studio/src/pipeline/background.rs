use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::scene::{AssetError, SceneAsset, SceneLoader, SceneNode};
use crate::task::JobError;

/// The single scene operation allowed to run off the tick thread.
pub(crate) enum BackgroundOperation {
    LoadScene {
        path: String,
        receiver: Receiver<Result<Arc<SceneAsset>, AssetError>>,
    },
    InstantiateScene {
        path: String,
        receiver: Receiver<Result<SceneNode, AssetError>>,
    },
}

pub(crate) enum BackgroundResult {
    SceneLoaded {
        path: String,
        result: Result<Arc<SceneAsset>, AssetError>,
    },
    SceneInstantiated {
        path: String,
        result: Result<SceneNode, AssetError>,
    },
}

pub(crate) enum BackgroundPoll {
    Pending(BackgroundOperation),
    Ready(BackgroundResult),
    /// Worker dropped its sender without reporting, most likely a panic.
    Lost,
}

impl BackgroundOperation {
    pub(crate) fn spawn_load(loader: Arc<dyn SceneLoader>, path: String) -> Result<Self, JobError> {
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.clone();
        spawn_worker("photo-studio-load", move || {
            let _ = sender.send(loader.load(&worker_path));
        })?;
        debug!(path = path.as_str(), "photo_background_load_started");
        Ok(Self::LoadScene { path, receiver })
    }

    pub(crate) fn spawn_instantiate(
        loader: Arc<dyn SceneLoader>,
        asset: Arc<SceneAsset>,
    ) -> Result<Self, JobError> {
        let (sender, receiver) = mpsc::channel();
        let path = asset.path.clone();
        spawn_worker("photo-studio-instance", move || {
            let _ = sender.send(loader.instantiate(&asset));
        })?;
        debug!(path = path.as_str(), "photo_background_instance_started");
        Ok(Self::InstantiateScene { path, receiver })
    }

    /// Non-blocking. Hands the operation back while the worker is running.
    pub(crate) fn poll(self) -> BackgroundPoll {
        match self {
            Self::LoadScene { path, receiver } => match receiver.try_recv() {
                Ok(result) => BackgroundPoll::Ready(BackgroundResult::SceneLoaded { path, result }),
                Err(TryRecvError::Empty) => {
                    BackgroundPoll::Pending(Self::LoadScene { path, receiver })
                }
                Err(TryRecvError::Disconnected) => BackgroundPoll::Lost,
            },
            Self::InstantiateScene { path, receiver } => match receiver.try_recv() {
                Ok(result) => {
                    BackgroundPoll::Ready(BackgroundResult::SceneInstantiated { path, result })
                }
                Err(TryRecvError::Empty) => {
                    BackgroundPoll::Pending(Self::InstantiateScene { path, receiver })
                }
                Err(TryRecvError::Disconnected) => BackgroundPoll::Lost,
            },
        }
    }
}

fn spawn_worker(name: &str, work: impl FnOnce() + Send + 'static) -> Result<(), JobError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map(|_| ())
        .map_err(|error| JobError::BackgroundSpawn {
            message: error.to_string(),
        })
}

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use thiserror::Error;
use tracing::warn;

use crate::fingerprint::Fingerprint;
use crate::pipeline::Step;
use crate::render::CaptureError;
use crate::scene::AssetError;
use crate::simulation::RegistryError;
use crate::subject::{Subject, SubjectError};

pub const DEFAULT_PRIORITY: i32 = 1;

static TASK_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_task_lock_poison_once() {
    if TASK_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!("image task lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to load scene {path}: {source}")]
    SceneLoad {
        path: String,
        #[source]
        source: Arc<AssetError>,
    },
    #[error("failed to instantiate scene {path}: {source}")]
    SceneInstantiate {
        path: String,
        #[source]
        source: Arc<AssetError>,
    },
    #[error("no scene is loaded for the current job")]
    SceneNotLoaded,
    #[error("no scene is instanced for the current job")]
    SceneNotInstanced,
    #[error("subject could not be staged: {0}")]
    Subject(#[from] SubjectError),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("simulation did not stabilize within {ticks} ticks")]
    StabilizationTimeout { ticks: u32 },
    #[error("failed to start background worker: {message}")]
    BackgroundSpawn { message: String },
    #[error("background worker exited without reporting a result")]
    BackgroundWorkerLost,
    #[error("pipeline reached {step:?} without an active job")]
    NoActiveJob { step: Step },
}

pub type JobOutcome = Result<ImageArtifact, JobError>;

type CompletionCallback = Box<dyn FnOnce(&JobOutcome) + Send>;

/// GPU-ready view of a capture: the base image followed by every mip level
/// down to 1x1.
pub struct Texture {
    levels: Vec<Arc<RgbaImage>>,
}

impl Texture {
    pub fn width(&self) -> u32 {
        self.levels.first().map_or(0, |level| level.width())
    }

    pub fn height(&self) -> u32 {
        self.levels.first().map_or(0, |level| level.height())
    }

    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&RgbaImage> {
        self.levels.get(index).map(Arc::as_ref)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("mip_count", &self.mip_count())
            .finish()
    }
}

/// Finished photograph. Cheap to clone.
#[derive(Clone)]
pub struct ImageArtifact {
    texture: Arc<Texture>,
    image: Arc<RgbaImage>,
}

impl ImageArtifact {
    /// Builds the mip chain; the base level shares storage with `image()`.
    pub fn from_rgba(image: RgbaImage) -> Self {
        let image = Arc::new(image);
        let texture = Arc::new(Texture {
            levels: build_mip_chain(Arc::clone(&image)),
        });
        Self { texture, image }
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("dimensions", &self.dimensions())
            .field("texture", &self.texture)
            .finish()
    }
}

fn build_mip_chain(base: Arc<RgbaImage>) -> Vec<Arc<RgbaImage>> {
    let (mut width, mut height) = base.dimensions();
    let mut current = Arc::clone(&base);
    let mut levels = vec![base];
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        let next = Arc::new(imageops::resize(
            current.as_ref(),
            width,
            height,
            FilterType::Triangle,
        ));
        levels.push(Arc::clone(&next));
        current = next;
    }
    levels
}

struct TaskState {
    outcome: Option<JobOutcome>,
    callbacks: Vec<CompletionCallback>,
}

struct TaskShared {
    subject: Subject,
    priority: i32,
    fingerprint: Fingerprint,
    state: Mutex<TaskState>,
}

/// Handle to one requested photograph. Every caller that asked for the same
/// fingerprint while it was in flight holds a clone of the same task.
#[derive(Clone)]
pub struct ImageTask {
    shared: Arc<TaskShared>,
}

impl ImageTask {
    pub(crate) fn new(subject: Subject, priority: i32, fingerprint: Fingerprint) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                subject,
                priority,
                fingerprint,
                state: Mutex::new(TaskState {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
            }),
        }
    }

    /// Already finished task wrapping a cached artifact.
    pub(crate) fn finished(
        subject: Subject,
        priority: i32,
        fingerprint: Fingerprint,
        artifact: ImageArtifact,
    ) -> Self {
        let task = Self::new(subject, priority, fingerprint);
        task.lock_state().outcome = Some(Ok(artifact));
        task
    }

    pub fn subject(&self) -> &Subject {
        &self.shared.subject
    }

    pub fn priority(&self) -> i32 {
        self.shared.priority
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.shared.fingerprint
    }

    pub fn is_finished(&self) -> bool {
        self.lock_state().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        self.lock_state().outcome.clone()
    }

    pub fn artifact(&self) -> Option<ImageArtifact> {
        match &self.lock_state().outcome {
            Some(Ok(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    /// Runs `callback` once the task completes, or right away if it already
    /// has.
    pub fn on_finished(&self, callback: impl FnOnce(&JobOutcome) + Send + 'static) {
        let outcome = {
            let mut state = self.lock_state();
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        callback(&outcome);
    }

    pub fn same_task(&self, other: &ImageTask) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Stores the outcome and fires every registered callback exactly once.
    /// Returns false if the task had already completed.
    pub(crate) fn complete(&self, outcome: JobOutcome) -> bool {
        let callbacks = {
            let mut state = self.lock_state();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_task_lock_poison_once();
                poisoned.into_inner()
            }
        }
    }
}

impl fmt::Debug for ImageTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageTask")
            .field("subject", &self.shared.subject)
            .field("priority", &self.shared.priority)
            .field("finished", &self.is_finished())
            .finish()
    }
}

mod background;
mod step;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{
    ArtifactCache, ArtifactStore, CacheBackendKind, CacheEntry, DiskCache, MemoryCache,
};
use crate::config::StudioConfig;
use crate::fingerprint::Fingerprint;
use crate::queue::TaskQueue;
use crate::render::{CameraPose, CaptureError, CaptureViewport, StageView, UpdateMode};
use crate::scene::{SceneAsset, SceneLoader, SceneNode, Vec3};
use crate::simulation::{RegistryError, SimulationKind, SimulationSlot, WorldSimulationRegistry};
use crate::subject::{self, Subject};
use crate::task::{ImageArtifact, ImageTask, JobError, DEFAULT_PRIORITY};

use background::{BackgroundOperation, BackgroundPoll, BackgroundResult};

pub use step::{Step, StepOutcome};

type StepResult = Result<StepOutcome, JobError>;

/// Collaborators the studio drives but does not implement.
pub struct StudioServices {
    pub loader: Arc<dyn SceneLoader>,
    pub viewport: Box<dyn CaptureViewport>,
    pub simulations: WorldSimulationRegistry,
    /// Backing store for the disk cache. Without one only the memory cache is
    /// available.
    pub durable_store: Option<Box<dyn ArtifactStore>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheSwitchError {
    #[error("disk cache requested but no durable artifact store was provided")]
    DurableStoreUnavailable,
}

/// Single-consumer photo scheduler. Call [`PhotoStudio::tick`] once per
/// frame; each call runs at most one pipeline step of the current job.
pub struct PhotoStudio {
    config: StudioConfig,
    loader: Arc<dyn SceneLoader>,
    viewport: Box<dyn CaptureViewport>,
    simulations: WorldSimulationRegistry,

    memory_cache: MemoryCache,
    disk_cache: Option<DiskCache>,
    cache_backend: CacheBackendKind,

    queue: TaskQueue,
    step: Step,
    current: Option<ImageTask>,
    background: Option<BackgroundOperation>,

    camera: CameraPose,
    previous_simulation: Option<SimulationKind>,
    loaded_scene: Option<Arc<SceneAsset>>,
    instanced_scene: Option<SceneNode>,
    /// Whether `instanced_scene` is the render holder's child.
    scene_attached: bool,
    previous_scene_was_correct: bool,
    captured_frame: Option<DynamicImage>,
    stabilization_ticks: u32,
}

impl PhotoStudio {
    pub fn new(config: StudioConfig, services: StudioServices) -> Self {
        let config = config.normalized();
        let disk_cache = services.durable_store.map(DiskCache::new);
        let cache_backend = match config.cache_backend {
            CacheBackendKind::Disk if disk_cache.is_none() => {
                warn!("disk cache configured without a durable store; using memory cache");
                CacheBackendKind::Memory
            }
            kind => kind,
        };
        let (width, height) = services.viewport.resolution();
        info!(
            backend = ?cache_backend,
            background_load = config.use_background_scene_load,
            background_instance = config.use_background_scene_instance,
            width,
            height,
            "photo_studio_created"
        );

        Self {
            memory_cache: MemoryCache::new(config.memory_cache),
            camera: CameraPose {
                position: Vec3::ZERO,
                fov_degrees: config.camera_fov_degrees,
            },
            config,
            loader: services.loader,
            viewport: services.viewport,
            simulations: services.simulations,
            disk_cache,
            cache_backend,
            queue: TaskQueue::new(),
            step: Step::Idle,
            current: None,
            background: None,
            previous_simulation: None,
            loaded_scene: None,
            instanced_scene: None,
            scene_attached: false,
            previous_scene_was_correct: false,
            captured_frame: None,
            stabilization_ticks: 0,
        }
    }

    /// Returns the task producing `subject`'s photo. Identical requests share
    /// one task while it is in flight, and cached results come back already
    /// finished.
    pub fn request_image(&mut self, subject: Subject, priority: i32) -> ImageTask {
        let fingerprint = subject.fingerprint();
        match self.try_get_from_cache(fingerprint) {
            Some(CacheEntry::Ready(artifact)) => {
                debug!(fingerprint = %fingerprint, "photo_cache_hit");
                return ImageTask::finished(subject, priority, fingerprint, artifact);
            }
            Some(CacheEntry::Pending(task)) => {
                debug!(fingerprint = %fingerprint, "photo_request_joined_pending_task");
                return task;
            }
            None => {}
        }

        let task = ImageTask::new(subject, priority, fingerprint);
        let sequence = self.queue.push(task.clone());
        self.active_cache_mut()
            .insert_pending(fingerprint, task.clone());
        info!(
            fingerprint = %fingerprint,
            priority,
            sequence,
            queued = self.queue.len(),
            "photo_job_enqueued"
        );
        task
    }

    pub fn request_image_default_priority(&mut self, subject: Subject) -> ImageTask {
        self.request_image(subject, DEFAULT_PRIORITY)
    }

    pub fn try_get_from_cache(&mut self, fingerprint: Fingerprint) -> Option<CacheEntry> {
        self.active_cache_mut().get(fingerprint)
    }

    pub fn cache_backend(&self) -> CacheBackendKind {
        self.cache_backend
    }

    /// Moves in-flight entries to the new backend. Switching to disk drops
    /// every finished artifact held in memory.
    pub fn set_cache_backend(&mut self, kind: CacheBackendKind) -> Result<(), CacheSwitchError> {
        if kind == self.cache_backend {
            return Ok(());
        }
        if kind == CacheBackendKind::Disk && self.disk_cache.is_none() {
            return Err(CacheSwitchError::DurableStoreUnavailable);
        }

        let pending = self.active_cache_mut().drain_pending();
        if kind == CacheBackendKind::Disk {
            self.memory_cache.clear();
        }
        let from = self.cache_backend;
        self.cache_backend = kind;
        let migrated = pending.len();
        let cache = self.active_cache_mut();
        for (fingerprint, task) in pending {
            cache.insert_pending(fingerprint, task);
        }
        info!(from = ?from, to = ?kind, migrated, "photo_cache_backend_switched");
        Ok(())
    }

    /// Advances the pipeline by at most one step.
    pub fn tick(&mut self, delta: f32) {
        if let Some(operation) = self.background.take() {
            let result = match operation.poll() {
                BackgroundPoll::Pending(operation) => {
                    self.background = Some(operation);
                    return;
                }
                BackgroundPoll::Ready(result) => self.apply_background_result(result),
                BackgroundPoll::Lost => Err(JobError::BackgroundWorkerLost),
            };
            self.finish_step(result);
            return;
        }

        let result = self.run_step(delta);
        self.finish_step(result);
    }

    /// Ticks until the queue is drained and the pipeline is idle. Returns the
    /// number of ticks used, or `None` if `max_ticks` ran out first.
    ///
    /// Unlike [`PhotoStudio::tick`] this blocks the calling thread: it sleeps
    /// 1ms after every tick that leaves a background load or instantiation
    /// outstanding. Frame-driven hosts should call `tick` instead.
    pub fn run_until_idle(&mut self, delta: f32, max_ticks: u32) -> Option<u32> {
        for ticks in 0..max_ticks {
            if self.is_idle() {
                return Some(ticks);
            }
            self.tick(delta);
            if self.background.is_some() {
                thread::sleep(Duration::from_millis(1));
            }
        }
        self.is_idle().then_some(max_ticks)
    }

    /// Drops cached artifacts and tears down every simulation. Queued jobs
    /// are left unfinished.
    pub fn shutdown(&mut self) {
        self.memory_cache.clear();
        if let Some(disk) = self.disk_cache.as_mut() {
            disk.clear();
        }
        self.background = None;
        self.simulations.destroy_all();
        self.previous_simulation = None;
        info!(queued = self.queue.len(), "photo_studio_shut_down");
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn current_fingerprint(&self) -> Option<Fingerprint> {
        self.current.as_ref().map(ImageTask::fingerprint)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Sequence number the next enqueued job will receive.
    pub fn next_insertion_sequence(&self) -> u64 {
        self.queue.next_sequence()
    }

    pub fn is_idle(&self) -> bool {
        !self.step.is_busy() && self.current.is_none() && self.queue.is_empty()
    }

    pub fn has_background_operation(&self) -> bool {
        self.background.is_some()
    }

    pub fn camera(&self) -> CameraPose {
        self.camera
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn simulations(&self) -> &WorldSimulationRegistry {
        &self.simulations
    }

    pub fn simulations_mut(&mut self) -> &mut WorldSimulationRegistry {
        &mut self.simulations
    }

    /// Scene currently parented under the render holder.
    pub fn attached_scene(&self) -> Option<&SceneNode> {
        self.instanced_scene
            .as_ref()
            .filter(|_| self.scene_attached)
    }

    pub fn camera_distance_from_radius(&self, radius: f32) -> f32 {
        subject::camera_distance_from_radius(radius, self.config.camera_fov_degrees)
    }

    fn active_cache_mut(&mut self) -> &mut dyn ArtifactCache {
        match (self.cache_backend, self.disk_cache.as_mut()) {
            (CacheBackendKind::Disk, Some(disk)) => disk as &mut dyn ArtifactCache,
            _ => &mut self.memory_cache,
        }
    }

    fn finish_step(&mut self, result: StepResult) {
        match result {
            Ok(outcome) => {
                let next = self.step.transition(outcome);
                if next != self.step {
                    debug!(from = ?self.step, to = ?next, "photo_step_advanced");
                }
                self.step = next;
            }
            Err(error) => self.fail_current(error),
        }
    }

    /// Completes the current job with `error`, forgets its pending cache entry
    /// so a later request retries, and routes the pipeline to cleanup.
    fn fail_current(&mut self, error: JobError) {
        let step = self.step;
        match self.current.take() {
            Some(task) => {
                let fingerprint = task.fingerprint();
                warn!(
                    fingerprint = %fingerprint,
                    step = ?step,
                    error = %error,
                    "photo_job_failed"
                );
                self.active_cache_mut().forget(fingerprint);
                task.complete(Err(error));
            }
            None => warn!(step = ?step, error = %error, "photo_step_failed_without_job"),
        }

        self.background = None;
        self.loaded_scene = None;
        self.instanced_scene = None;
        self.scene_attached = false;
        self.previous_scene_was_correct = false;
        self.captured_frame = None;
        self.step = step.transition(StepOutcome::Failed);
    }

    fn run_step(&mut self, delta: f32) -> StepResult {
        let subject = self.current.as_ref().map(|task| task.subject().clone());
        match (self.step, subject) {
            (Step::Idle, _) => Ok(self.start_next_job(delta)),
            (Step::Cleanup, _) => Ok(self.cleanup()),
            (step, None) => Err(JobError::NoActiveJob { step }),
            (Step::LoadSubjectAsset, Some(subject)) => self.load_subject_asset(&subject),
            (Step::InstantiateSubject, Some(subject)) => self.instantiate_subject(&subject),
            (Step::ApplySubjectParameters, Some(subject)) => self.apply_subject_parameters(&subject),
            (Step::AttachToScene, Some(subject)) => self.attach_to_scene(&subject),
            (Step::AwaitStabilization, Some(subject)) => self.await_stabilization(&subject),
            (Step::PositionCamera, Some(subject)) => self.position_camera(&subject),
            (Step::Render, Some(_)) => self.render(),
            (Step::CaptureFrame, Some(_)) => self.capture_frame(),
            (Step::PersistResult, Some(_)) => self.persist_result(),
        }
    }

    fn start_next_job(&mut self, delta: f32) -> StepOutcome {
        let elapsed = Duration::try_from_secs_f32(delta).unwrap_or(Duration::ZERO);
        self.memory_cache.maintain(elapsed);

        let Some(task) = self.queue.pop() else {
            return StepOutcome::Stay;
        };
        info!(
            fingerprint = %task.fingerprint(),
            priority = task.priority(),
            remaining = self.queue.len(),
            "photo_job_started"
        );
        self.current = Some(task);
        self.stabilization_ticks = 0;
        StepOutcome::Advance
    }

    fn load_subject_asset(&mut self, subject: &Subject) -> StepResult {
        match subject {
            Subject::Simulation(simulation) => {
                let kind = simulation.simulation_kind();
                self.simulations.get_or_create(kind)?;
                if let Some(previous) = self.previous_simulation.filter(|previous| *previous != kind) {
                    self.simulations.set_visible(previous, false);
                }
                self.previous_simulation = Some(kind);
                Ok(StepOutcome::Advance)
            }
            Subject::Scene(scene) => {
                let path = scene.scene_path();
                let reusable = self.instanced_scene.is_some()
                    && self
                        .loaded_scene
                        .as_ref()
                        .is_some_and(|asset| asset.path == path);
                if reusable {
                    self.previous_scene_was_correct = true;
                    debug!(path, "photo_scene_reused");
                    return Ok(StepOutcome::SceneReused);
                }

                self.previous_scene_was_correct = false;
                if self.config.use_background_scene_load {
                    self.background = Some(BackgroundOperation::spawn_load(
                        Arc::clone(&self.loader),
                        path.to_string(),
                    )?);
                    return Ok(StepOutcome::Stay);
                }
                let asset = self
                    .loader
                    .load(path)
                    .map_err(|source| JobError::SceneLoad {
                        path: path.to_string(),
                        source: Arc::new(source),
                    })?;
                self.loaded_scene = Some(asset);
                Ok(StepOutcome::Advance)
            }
        }
    }

    fn instantiate_subject(&mut self, subject: &Subject) -> StepResult {
        match subject {
            Subject::Simulation(simulation) => {
                self.simulations
                    .set_visible(simulation.simulation_kind(), true);
                self.instanced_scene = None;
                self.scene_attached = false;
                self.loaded_scene = None;
                Ok(StepOutcome::Advance)
            }
            Subject::Scene(_) => {
                let asset = self
                    .loaded_scene
                    .as_ref()
                    .map(Arc::clone)
                    .ok_or(JobError::SceneNotLoaded)?;
                if self.config.use_background_scene_instance {
                    self.background = Some(BackgroundOperation::spawn_instantiate(
                        Arc::clone(&self.loader),
                        asset,
                    )?);
                    return Ok(StepOutcome::Stay);
                }
                let node = self
                    .loader
                    .instantiate(&asset)
                    .map_err(|source| JobError::SceneInstantiate {
                        path: asset.path.clone(),
                        source: Arc::new(source),
                    })?;
                self.replace_instanced_scene(node);
                Ok(StepOutcome::Advance)
            }
        }
    }

    fn apply_background_result(&mut self, result: BackgroundResult) -> StepResult {
        match result {
            BackgroundResult::SceneLoaded { path, result } => {
                let asset = result.map_err(|source| JobError::SceneLoad {
                    path,
                    source: Arc::new(source),
                })?;
                self.loaded_scene = Some(asset);
            }
            BackgroundResult::SceneInstantiated { path, result } => {
                let node = result.map_err(|source| JobError::SceneInstantiate {
                    path,
                    source: Arc::new(source),
                })?;
                self.replace_instanced_scene(node);
            }
        }
        Ok(StepOutcome::Advance)
    }

    fn replace_instanced_scene(&mut self, node: SceneNode) {
        self.instanced_scene = Some(node);
        self.scene_attached = false;
    }

    fn apply_subject_parameters(&mut self, subject: &Subject) -> StepResult {
        match subject {
            Subject::Simulation(simulation) => {
                let slot = self.simulation_slot(simulation.simulation_kind())?;
                simulation.setup_world_entities(slot.simulation_mut())?;
            }
            Subject::Scene(scene) => {
                if let Some(previous) = self.previous_simulation.take() {
                    self.simulations.set_visible(previous, false);
                }
                let node = self
                    .instanced_scene
                    .as_mut()
                    .ok_or(JobError::SceneNotInstanced)?;
                scene.apply_scene_parameters(node)?;
            }
        }
        Ok(StepOutcome::Advance)
    }

    fn attach_to_scene(&mut self, subject: &Subject) -> StepResult {
        match subject {
            Subject::Simulation(simulation) => {
                let time_step = self.config.simulation_time_step;
                let slot = self.simulation_slot(simulation.simulation_kind())?;
                slot.simulation_mut().process_logic(time_step);
            }
            Subject::Scene(_) => {
                if self.instanced_scene.is_none() {
                    return Err(JobError::SceneNotInstanced);
                }
                if !self.previous_scene_was_correct {
                    self.scene_attached = true;
                    debug!("photo_scene_attached");
                }
            }
        }
        Ok(StepOutcome::Advance)
    }

    fn await_stabilization(&mut self, subject: &Subject) -> StepResult {
        let Subject::Simulation(simulation) = subject else {
            // Scenes only need the one-tick delay this step provides.
            return Ok(StepOutcome::Advance);
        };
        let time_step = self.config.simulation_time_step;
        let tick_limit = self.config.stabilization_tick_limit;
        let warn_interval = self.config.stabilization_warn_interval;
        let kind = simulation.simulation_kind();
        let slot = self.simulation_slot(kind)?;

        let settled = !slot.simulation().has_pending_operations()
            && simulation.state_has_stabilized(slot.simulation());
        if settled {
            let (world, root) = slot.parts_mut();
            world.process_all(time_step, root);
            return Ok(StepOutcome::Advance);
        }

        slot.simulation_mut().process_logic(time_step);
        self.stabilization_ticks += 1;
        let ticks = self.stabilization_ticks;
        if tick_limit.is_some_and(|limit| ticks >= limit) {
            return Err(JobError::StabilizationTimeout { ticks });
        }
        if ticks % warn_interval == 0 {
            warn!(kind = ?kind, ticks, "photo_simulation_still_stabilizing");
        }
        Ok(StepOutcome::Stay)
    }

    fn position_camera(&mut self, subject: &Subject) -> StepResult {
        let position = match subject {
            Subject::Simulation(simulation) => {
                let slot = self.simulation_slot(simulation.simulation_kind())?;
                simulation.photograph_position(slot.simulation())
            }
            Subject::Scene(scene) => {
                let node = self
                    .instanced_scene
                    .as_ref()
                    .ok_or(JobError::SceneNotInstanced)?;
                scene.photograph_position(node)
            }
        };
        self.camera = CameraPose {
            position,
            fov_degrees: self.config.camera_fov_degrees,
        };
        debug!(x = position.x, y = position.y, z = position.z, "photo_camera_positioned");
        Ok(StepOutcome::Advance)
    }

    fn render(&mut self) -> StepResult {
        self.viewport.set_update_mode(UpdateMode::Once);
        let stage = StageView {
            camera: self.camera,
            holder: self
                .instanced_scene
                .as_ref()
                .filter(|_| self.scene_attached),
            simulation_roots: self.simulations.visible_roots().collect(),
        };
        self.viewport.render(&stage)?;
        Ok(StepOutcome::Advance)
    }

    fn capture_frame(&mut self) -> StepResult {
        self.captured_frame = Some(self.viewport.read_frame()?);
        Ok(StepOutcome::Advance)
    }

    fn persist_result(&mut self) -> StepResult {
        let frame = self
            .captured_frame
            .take()
            .ok_or(JobError::Capture(CaptureError::NotRendered))?;
        let task = self.current.take().ok_or(JobError::NoActiveJob {
            step: Step::PersistResult,
        })?;
        let artifact = ImageArtifact::from_rgba(frame.into_rgba8());
        let fingerprint = task.fingerprint();
        let (width, height) = artifact.dimensions();

        self.active_cache_mut().complete(fingerprint, &artifact);
        task.complete(Ok(artifact));
        info!(fingerprint = %fingerprint, width, height, "photo_job_finished");
        Ok(StepOutcome::Advance)
    }

    fn cleanup(&mut self) -> StepOutcome {
        if let Some(kind) = self.previous_simulation {
            if let Some(slot) = self.simulations.get_mut(kind) {
                let (world, root) = slot.parts_mut();
                world.destroy_all_entities(root);
            }
        }
        self.captured_frame = None;
        self.stabilization_ticks = 0;
        StepOutcome::Advance
    }

    fn simulation_slot(
        &mut self,
        kind: SimulationKind,
    ) -> Result<&mut SimulationSlot, JobError> {
        self.simulations
            .get_mut(kind)
            .ok_or(JobError::Registry(RegistryError::UnknownKind { kind }))
    }
}

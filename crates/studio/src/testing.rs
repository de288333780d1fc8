use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::fingerprint::{Fingerprint, FingerprintBuilder};
use crate::scene::{AssetError, SceneAsset, SceneLoader, SceneNode, Vec3};
use crate::simulation::{SimulationKind, WorldSimulation};
use crate::subject::{
    camera_distance_from_radius, Photographable, ScenePhotographable, SimulationPhotographable,
    SubjectError,
};

/// Blocks background workers until a test opens it.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub(crate) fn open(&self) {
        let (open, signal) = &*self.state;
        *open.lock().expect("gate lock") = true;
        signal.notify_all();
    }

    fn wait(&self) {
        let (open, signal) = &*self.state;
        let mut guard = open.lock().expect("gate lock");
        while !*guard {
            guard = signal.wait(guard).expect("gate wait");
        }
    }
}

/// In-memory scene loader that counts calls.
#[derive(Default)]
pub(crate) struct FakeLoader {
    scenes: HashMap<String, SceneNode>,
    broken_instances: HashSet<String>,
    gate: Option<Gate>,
    pub(crate) load_calls: AtomicUsize,
    pub(crate) instantiate_calls: AtomicUsize,
}

impl FakeLoader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_scene(mut self, path: &str, root: SceneNode) -> Self {
        self.scenes.insert(path.to_string(), root);
        self
    }

    pub(crate) fn with_broken_instance(mut self, path: &str) -> Self {
        self.broken_instances.insert(path.to_string());
        self
    }

    pub(crate) fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn loads(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn instantiations(&self) -> usize {
        self.instantiate_calls.load(Ordering::SeqCst)
    }
}

impl SceneLoader for FakeLoader {
    fn load(&self, path: &str) -> Result<Arc<SceneAsset>, AssetError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let root = self
            .scenes
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::Read {
                file: path.into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such scene"),
            })?;
        Ok(Arc::new(SceneAsset {
            path: path.to_string(),
            root,
        }))
    }

    fn instantiate(&self, asset: &SceneAsset) -> Result<SceneNode, AssetError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.instantiate_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_instances.contains(&asset.path) {
            return Err(AssetError::Instantiate {
                path: asset.path.clone(),
                message: "broken scene".to_string(),
            });
        }
        Ok(asset.root.clone())
    }
}

/// Scripted simulation: entities appear on setup, pending work drains one
/// unit per logic step, and it settles after a configurable number of steps.
#[derive(Debug, Default)]
pub(crate) struct FakeSimulation {
    pub(crate) init_calls: usize,
    pub(crate) entities: usize,
    pub(crate) color: [u8; 4],
    pub(crate) pending_operations: u32,
    pub(crate) settle_after_steps: Option<u32>,
    pub(crate) steps_since_setup: u32,
    pub(crate) logic_steps: u32,
    pub(crate) process_all_calls: u32,
    pub(crate) destroy_calls: u32,
    pub(crate) disposed: bool,
}

impl FakeSimulation {
    pub(crate) fn is_settled(&self) -> bool {
        self.settle_after_steps
            .is_some_and(|steps| self.steps_since_setup >= steps)
    }
}

impl WorldSimulation for FakeSimulation {
    fn init(&mut self, _root: &mut SceneNode) {
        self.init_calls += 1;
    }

    fn process_logic(&mut self, _delta: f32) {
        self.logic_steps += 1;
        self.steps_since_setup += 1;
        self.pending_operations = self.pending_operations.saturating_sub(1);
    }

    fn process_all(&mut self, delta: f32, root: &mut SceneNode) {
        self.process_logic(delta);
        self.process_all_calls += 1;
        root.clear_children();
        for index in 0..self.entities {
            let offset = index as f32 - self.entities as f32 * 0.5;
            root.add_child(
                SceneNode::new(format!("entity_{index}"))
                    .with_translation(Vec3::new(offset, 0.0, 0.0))
                    .with_shape(0.5, self.color),
            );
        }
    }

    fn has_pending_operations(&self) -> bool {
        self.pending_operations > 0
    }

    fn entity_count(&self) -> usize {
        self.entities
    }

    fn destroy_all_entities(&mut self, root: &mut SceneNode) {
        self.entities = 0;
        self.destroy_calls += 1;
        root.clear_children();
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Scene subject that tints every shape of the scene it is handed.
pub(crate) struct TestSceneSubject {
    path: String,
    color: [u8; 4],
    applied: Arc<AtomicUsize>,
}

impl TestSceneSubject {
    pub(crate) fn new(path: &str, color: [u8; 4]) -> Self {
        Self {
            path: path.to_string(),
            color,
            applied: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn applied_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.applied)
    }
}

impl Photographable for TestSceneSubject {
    fn visual_fingerprint(&self) -> Fingerprint {
        FingerprintBuilder::new("test_scene")
            .write_str(&self.path)
            .write_rgba(self.color)
            .finish()
    }
}

impl ScenePhotographable for TestSceneSubject {
    fn scene_path(&self) -> &str {
        &self.path
    }

    fn apply_scene_parameters(&self, scene: &mut SceneNode) -> Result<(), SubjectError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        scene.set_tint(Some(self.color));
        Ok(())
    }

    fn photograph_position(&self, scene: &SceneNode) -> Vec3 {
        let radius = scene.bounding_radius().max(0.5);
        Vec3::new(0.0, 0.0, camera_distance_from_radius(radius, 70.0))
    }
}

/// Simulation subject that seeds a [`FakeSimulation`].
pub(crate) struct TestSimulationSubject {
    kind: SimulationKind,
    count: usize,
    color: [u8; 4],
    pending_operations: u32,
    settle_after_steps: Option<u32>,
}

impl TestSimulationSubject {
    pub(crate) fn new(kind: SimulationKind, count: usize) -> Self {
        Self {
            kind,
            count,
            color: [40, 200, 90, 255],
            pending_operations: 0,
            settle_after_steps: Some(0),
        }
    }

    pub(crate) fn with_pending_operations(mut self, pending: u32) -> Self {
        self.pending_operations = pending;
        self
    }

    pub(crate) fn settling_after(mut self, steps: u32) -> Self {
        self.settle_after_steps = Some(steps);
        self
    }

    pub(crate) fn never_settling(mut self) -> Self {
        self.settle_after_steps = None;
        self
    }
}

impl Photographable for TestSimulationSubject {
    fn visual_fingerprint(&self) -> Fingerprint {
        FingerprintBuilder::new("test_simulation")
            .write_str(&format!("{:?}", self.kind))
            .write_u64(self.count as u64)
            .write_rgba(self.color)
            .finish()
    }
}

impl SimulationPhotographable for TestSimulationSubject {
    fn simulation_kind(&self) -> SimulationKind {
        self.kind
    }

    fn setup_world_entities(
        &self,
        simulation: &mut dyn WorldSimulation,
    ) -> Result<(), SubjectError> {
        let fake = simulation
            .as_any_mut()
            .downcast_mut::<FakeSimulation>()
            .ok_or_else(|| SubjectError::new("expected a fake simulation"))?;
        fake.entities = self.count;
        fake.color = self.color;
        fake.pending_operations = self.pending_operations;
        fake.settle_after_steps = self.settle_after_steps;
        fake.steps_since_setup = 0;
        Ok(())
    }

    fn state_has_stabilized(&self, simulation: &dyn WorldSimulation) -> bool {
        simulation
            .as_any()
            .downcast_ref::<FakeSimulation>()
            .is_some_and(FakeSimulation::is_settled)
    }

    fn photograph_position(&self, simulation: &dyn WorldSimulation) -> Vec3 {
        let radius = (simulation.entity_count() as f32 * 0.5).max(1.0);
        Vec3::new(0.0, 0.0, camera_distance_from_radius(radius, 70.0))
    }
}

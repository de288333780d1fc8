use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::scene::{SceneNode, Vec3};
use crate::simulation::{SimulationKind, WorldSimulation};

/// Raised by a subject that cannot configure the content it was handed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubjectError {
    pub message: String,
}

impl SubjectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait Photographable: Send + Sync {
    /// Must be pure: same visual state, same value.
    fn visual_fingerprint(&self) -> Fingerprint;
}

/// A subject photographed by loading and instantiating a static scene.
pub trait ScenePhotographable: Photographable {
    fn scene_path(&self) -> &str;

    fn apply_scene_parameters(&self, scene: &mut SceneNode) -> Result<(), SubjectError>;

    fn photograph_position(&self, scene: &SceneNode) -> Vec3;
}

/// A subject photographed by seeding entities into a running simulation and
/// waiting for it to settle.
pub trait SimulationPhotographable: Photographable {
    fn simulation_kind(&self) -> SimulationKind;

    fn setup_world_entities(
        &self,
        simulation: &mut dyn WorldSimulation,
    ) -> Result<(), SubjectError>;

    /// Polled once per tick until true.
    fn state_has_stabilized(&self, simulation: &dyn WorldSimulation) -> bool;

    fn photograph_position(&self, simulation: &dyn WorldSimulation) -> Vec3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Scene,
    Simulation,
}

#[derive(Clone)]
pub enum Subject {
    Scene(Arc<dyn ScenePhotographable>),
    Simulation(Arc<dyn SimulationPhotographable>),
}

impl Subject {
    pub fn scene(subject: impl ScenePhotographable + 'static) -> Self {
        Self::Scene(Arc::new(subject))
    }

    pub fn simulation(subject: impl SimulationPhotographable + 'static) -> Self {
        Self::Simulation(Arc::new(subject))
    }

    pub fn kind(&self) -> SubjectKind {
        match self {
            Self::Scene(_) => SubjectKind::Scene,
            Self::Simulation(_) => SubjectKind::Simulation,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::Scene(subject) => subject.visual_fingerprint(),
            Self::Simulation(subject) => subject.visual_fingerprint(),
        }
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scene(subject) => f
                .debug_struct("Scene")
                .field("path", &subject.scene_path())
                .field("fingerprint", &subject.visual_fingerprint())
                .finish(),
            Self::Simulation(subject) => f
                .debug_struct("Simulation")
                .field("kind", &subject.simulation_kind())
                .field("fingerprint", &subject.visual_fingerprint())
                .finish(),
        }
    }
}

/// Distance at which a sphere of `radius` exactly fills a vertical field of
/// view of `fov_degrees`.
pub fn camera_distance_from_radius(radius: f32, fov_degrees: f32) -> f32 {
    let half_angle = (fov_degrees * 0.5).to_radians();
    radius / half_angle.sin()
}

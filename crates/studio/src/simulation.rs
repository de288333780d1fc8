use std::any::Any;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::scene::SceneNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    MicrobeGraphics,
    ColonyGraphics,
}

/// Boundary to an entity simulation that can be stepped headlessly.
///
/// Presentation state lives under the root node handed to `init`; the
/// simulation keeps no reference to it and receives it again on every call
/// that needs to touch visuals.
pub trait WorldSimulation {
    fn init(&mut self, root: &mut SceneNode);

    /// Advances logic systems only.
    fn process_logic(&mut self, delta: f32);

    /// Advances logic and refreshes presentation under `root`.
    fn process_all(&mut self, delta: f32, root: &mut SceneNode);

    /// True while any system still has asynchronous work queued.
    fn has_pending_operations(&self) -> bool;

    fn entity_count(&self) -> usize;

    fn destroy_all_entities(&mut self, root: &mut SceneNode);

    fn dispose(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type SimulationFactory = Box<dyn Fn() -> Box<dyn WorldSimulation>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no world simulation is registered for kind {kind:?}")]
    UnknownKind { kind: SimulationKind },
}

/// A long-lived simulation together with its dedicated root node.
pub struct SimulationSlot {
    simulation: Box<dyn WorldSimulation>,
    root: SceneNode,
}

impl SimulationSlot {
    pub fn simulation(&self) -> &dyn WorldSimulation {
        self.simulation.as_ref()
    }

    pub fn simulation_mut(&mut self) -> &mut dyn WorldSimulation {
        self.simulation.as_mut()
    }

    pub fn root(&self) -> &SceneNode {
        &self.root
    }

    pub fn is_visible(&self) -> bool {
        self.root.visible
    }

    /// Split borrow for calls that need both the simulation and its root.
    pub fn parts_mut(&mut self) -> (&mut dyn WorldSimulation, &mut SceneNode) {
        (self.simulation.as_mut(), &mut self.root)
    }
}

/// One lazily created simulation per [`SimulationKind`], reused across jobs.
#[derive(Default)]
pub struct WorldSimulationRegistry {
    factories: HashMap<SimulationKind, SimulationFactory>,
    worlds: HashMap<SimulationKind, SimulationSlot>,
}

impl WorldSimulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: SimulationKind,
        factory: impl Fn() -> Box<dyn WorldSimulation> + 'static,
    ) {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn is_registered(&self, kind: SimulationKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Validates `kind` before allocating anything, so an unknown kind leaves
    /// the registry untouched.
    pub fn get_or_create(
        &mut self,
        kind: SimulationKind,
    ) -> Result<&mut SimulationSlot, RegistryError> {
        if !self.worlds.contains_key(&kind) {
            let factory = self
                .factories
                .get(&kind)
                .ok_or(RegistryError::UnknownKind { kind })?;
            let mut root = SceneNode::new(format!("simulation_root_{kind:?}"));
            root.visible = false;
            let mut simulation = factory();
            simulation.init(&mut root);
            info!(kind = ?kind, "world_simulation_created");
            self.worlds.insert(kind, SimulationSlot { simulation, root });
        }
        self.worlds
            .get_mut(&kind)
            .ok_or(RegistryError::UnknownKind { kind })
    }

    pub fn get(&self, kind: SimulationKind) -> Option<&SimulationSlot> {
        self.worlds.get(&kind)
    }

    pub fn get_mut(&mut self, kind: SimulationKind) -> Option<&mut SimulationSlot> {
        self.worlds.get_mut(&kind)
    }

    pub fn set_visible(&mut self, kind: SimulationKind, visible: bool) {
        if let Some(slot) = self.worlds.get_mut(&kind) {
            if slot.root.visible != visible {
                debug!(kind = ?kind, visible, "world_simulation_visibility_changed");
            }
            slot.root.visible = visible;
        }
    }

    pub fn visible_roots(&self) -> impl Iterator<Item = &SceneNode> {
        self.worlds
            .values()
            .filter(|slot| slot.root.visible)
            .map(|slot| &slot.root)
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    /// Process teardown only. Factories stay registered.
    pub fn destroy_all(&mut self) {
        for (kind, mut slot) in self.worlds.drain() {
            slot.simulation.dispose();
            slot.root.clear_children();
            debug!(kind = ?kind, "world_simulation_disposed");
        }
    }
}

impl Drop for WorldSimulationRegistry {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::testing::FakeSimulation;

    #[test]
    fn get_or_create_builds_once_per_kind() {
        let created = Rc::new(Cell::new(0));
        let counter = Rc::clone(&created);
        let mut registry = WorldSimulationRegistry::new();
        registry.register(SimulationKind::MicrobeGraphics, move || {
            counter.set(counter.get() + 1);
            Box::new(FakeSimulation::default())
        });

        registry
            .get_or_create(SimulationKind::MicrobeGraphics)
            .expect("first");
        registry
            .get_or_create(SimulationKind::MicrobeGraphics)
            .expect("second");
        assert_eq!(created.get(), 1);
        assert_eq!(registry.len(), 1);

        let slot = registry
            .get(SimulationKind::MicrobeGraphics)
            .expect("slot");
        let fake = slot
            .simulation()
            .as_any()
            .downcast_ref::<FakeSimulation>()
            .expect("fake");
        assert_eq!(fake.init_calls, 1);
        assert!(!slot.is_visible());
    }

    #[test]
    fn unknown_kind_is_rejected_without_side_effects() {
        let mut registry = WorldSimulationRegistry::new();
        let error = registry
            .get_or_create(SimulationKind::ColonyGraphics)
            .err()
            .expect("error");
        assert_eq!(
            error,
            RegistryError::UnknownKind {
                kind: SimulationKind::ColonyGraphics
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn visibility_toggles_roots() {
        let mut registry = WorldSimulationRegistry::new();
        registry.register(SimulationKind::MicrobeGraphics, || {
            Box::new(FakeSimulation::default())
        });
        registry
            .get_or_create(SimulationKind::MicrobeGraphics)
            .expect("create");
        assert_eq!(registry.visible_roots().count(), 0);
        registry.set_visible(SimulationKind::MicrobeGraphics, true);
        assert_eq!(registry.visible_roots().count(), 1);
        registry.set_visible(SimulationKind::MicrobeGraphics, false);
        assert_eq!(registry.visible_roots().count(), 0);
    }

    #[test]
    fn destroy_all_disposes_and_empties() {
        let mut registry = WorldSimulationRegistry::new();
        registry.register(SimulationKind::MicrobeGraphics, || {
            Box::new(FakeSimulation::default())
        });
        registry
            .get_or_create(SimulationKind::MicrobeGraphics)
            .expect("create");
        registry.destroy_all();
        assert!(registry.is_empty());
        assert!(registry.is_registered(SimulationKind::MicrobeGraphics));
    }
}

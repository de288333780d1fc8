use std::any::Any;

use photo_studio::{SceneNode, Vec3, WorldSimulation};
use tracing::debug;

pub(crate) const CELL_RADIUS: f32 = 0.5;
/// Cells materialise a few per logic step, like deferred entity spawns.
const SPAWNS_PER_STEP: usize = 4;
const ATTRACTION: f32 = 0.8;
const REPULSION: f32 = 6.0;
const SETTLED_MOTION: f32 = 1e-3;
/// Relaxation gives up after this many steps and reports the colony settled.
const MAX_RELAX_STEPS: u32 = 600;
const GOLDEN_ANGLE: f32 = 2.399_963;

#[derive(Debug, Clone, Copy)]
struct Cell {
    position: Vec3,
    color: [u8; 4],
}

/// Small 2D cell colony: cells are pulled toward the origin and pushed apart
/// where they overlap until the layout stops moving.
#[derive(Debug, Default)]
pub(crate) struct ColonySimulation {
    cells: Vec<Cell>,
    spawn_queue: Vec<Cell>,
    last_motion: f32,
    relax_steps: u32,
}

impl ColonySimulation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces the colony with `count` cells queued for spawning.
    pub(crate) fn seed_colony(&mut self, count: u32, seed: u64, color: [u8; 4]) {
        self.cells.clear();
        self.spawn_queue = (0..count)
            .map(|index| Cell {
                position: spiral_position(index, seed),
                color: shade(color, index),
            })
            .collect();
        self.last_motion = f32::INFINITY;
        self.relax_steps = 0;
        debug!(count, seed, "colony_seeded");
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.spawn_queue.is_empty()
            && (self.last_motion < SETTLED_MOTION || self.relax_steps >= MAX_RELAX_STEPS)
    }

    /// Radius of an origin-centred circle enclosing every spawned cell.
    pub(crate) fn extent(&self) -> f32 {
        self.cells
            .iter()
            .map(|cell| cell.position.length() + CELL_RADIUS)
            .fold(CELL_RADIUS, f32::max)
    }

    fn spawn_pending(&mut self) {
        let count = self.spawn_queue.len().min(SPAWNS_PER_STEP);
        self.cells.extend(self.spawn_queue.drain(..count));
    }

    fn relax(&mut self, delta: f32) {
        let displacements = self
            .cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let mut force = cell.position * -ATTRACTION;
                for (other_index, other) in self.cells.iter().enumerate() {
                    if other_index == index {
                        continue;
                    }
                    let offset = cell.position - other.position;
                    let distance = offset.length();
                    let overlap = CELL_RADIUS * 2.0 - distance;
                    if overlap <= 0.0 {
                        continue;
                    }
                    let direction = if distance > 1e-4 {
                        offset * (1.0 / distance)
                    } else {
                        let angle = index as f32 * GOLDEN_ANGLE;
                        Vec3::new(angle.cos(), angle.sin(), 0.0)
                    };
                    force = force + direction * (overlap * REPULSION);
                }
                force * delta
            })
            .collect::<Vec<_>>();

        let mut motion = 0.0_f32;
        for (cell, displacement) in self.cells.iter_mut().zip(displacements) {
            cell.position = cell.position + displacement;
            motion = motion.max(displacement.length());
        }
        self.last_motion = motion;
        self.relax_steps += 1;
    }
}

impl WorldSimulation for ColonySimulation {
    fn init(&mut self, root: &mut SceneNode) {
        root.clear_children();
        debug!(root = root.name.as_str(), "colony_simulation_initialized");
    }

    fn process_logic(&mut self, delta: f32) {
        self.spawn_pending();
        self.relax(delta);
    }

    fn process_all(&mut self, delta: f32, root: &mut SceneNode) {
        self.process_logic(delta);
        root.clear_children();
        for (index, cell) in self.cells.iter().enumerate() {
            root.add_child(
                SceneNode::new(format!("cell_{index}"))
                    .with_translation(cell.position)
                    .with_shape(CELL_RADIUS, cell.color),
            );
        }
    }

    fn has_pending_operations(&self) -> bool {
        !self.spawn_queue.is_empty()
    }

    fn entity_count(&self) -> usize {
        self.cells.len()
    }

    fn destroy_all_entities(&mut self, root: &mut SceneNode) {
        self.cells.clear();
        self.spawn_queue.clear();
        self.last_motion = 0.0;
        root.clear_children();
    }

    fn dispose(&mut self) {
        self.cells.clear();
        self.spawn_queue.clear();
        debug!("colony_simulation_disposed");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn spiral_position(index: u32, seed: u64) -> Vec3 {
    let phase = (seed % 360) as f32;
    let angle = index as f32 * GOLDEN_ANGLE + phase.to_radians();
    let radius = CELL_RADIUS * 2.2 * ((index + 1) as f32).sqrt();
    Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0)
}

fn shade(color: [u8; 4], index: u32) -> [u8; 4] {
    let factor = 0.85 + 0.15 * ((index * 37 % 10) as f32 / 9.0);
    let scale = |channel: u8| (channel as f32 * factor).round().min(255.0) as u8;
    [scale(color[0]), scale(color[1]), scale(color[2]), color[3]]
}

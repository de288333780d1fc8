use photo_studio::{
    camera_distance_from_radius, Fingerprint, FingerprintBuilder, Photographable,
    ScenePhotographable, SceneNode, SimulationKind, SimulationPhotographable, Subject,
    SubjectError, Vec3, WorldSimulation,
};

use super::colony_sim::{ColonySimulation, CELL_RADIUS};
use super::job_script::SubjectSpec;

/// Smallest radius the camera frames, so empty scenes still get a sane pose.
const MIN_FRAMED_RADIUS: f32 = 0.5;

pub(crate) fn build_subject(spec: &SubjectSpec, fov_degrees: f32) -> Subject {
    match spec {
        SubjectSpec::Scene { scene, tint, scale } => Subject::scene(TintedSceneSubject {
            path: scene.clone(),
            tint: *tint,
            scale: *scale,
            fov_degrees,
        }),
        SubjectSpec::Colony { cells, seed, color } => Subject::simulation(ColonySubject {
            cells: *cells,
            seed: *seed,
            color: *color,
            fov_degrees,
        }),
    }
}

fn framed_position(radius: f32, fov_degrees: f32) -> Vec3 {
    let distance = camera_distance_from_radius(radius.max(MIN_FRAMED_RADIUS), fov_degrees);
    Vec3::new(0.0, 0.0, distance)
}

/// A scene resource, optionally recoloured and rescaled.
pub(crate) struct TintedSceneSubject {
    path: String,
    tint: Option<[u8; 4]>,
    scale: f32,
    fov_degrees: f32,
}

impl Photographable for TintedSceneSubject {
    fn visual_fingerprint(&self) -> Fingerprint {
        let mut builder = FingerprintBuilder::new("tinted_scene");
        builder.write_str(&self.path).write_f32(self.scale);
        match self.tint {
            Some(tint) => builder.write_bool(true).write_rgba(tint),
            None => builder.write_bool(false),
        };
        builder.finish()
    }
}

impl ScenePhotographable for TintedSceneSubject {
    fn scene_path(&self) -> &str {
        &self.path
    }

    fn apply_scene_parameters(&self, scene: &mut SceneNode) -> Result<(), SubjectError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(SubjectError::new(format!(
                "scale {} must be positive",
                self.scale
            )));
        }
        // A reused scene still carries the previous subject's parameters.
        scene.scale = self.scale;
        scene.set_tint(self.tint);
        Ok(())
    }

    fn photograph_position(&self, scene: &SceneNode) -> Vec3 {
        framed_position(scene.bounding_radius(), self.fov_degrees)
    }
}

/// A colony of `cells` grown in the colony simulation.
pub(crate) struct ColonySubject {
    cells: u32,
    seed: u64,
    color: [u8; 4],
    fov_degrees: f32,
}

impl Photographable for ColonySubject {
    fn visual_fingerprint(&self) -> Fingerprint {
        FingerprintBuilder::new("colony")
            .write_u32(self.cells)
            .write_u64(self.seed)
            .write_rgba(self.color)
            .finish()
    }
}

impl SimulationPhotographable for ColonySubject {
    fn simulation_kind(&self) -> SimulationKind {
        SimulationKind::ColonyGraphics
    }

    fn setup_world_entities(
        &self,
        simulation: &mut dyn WorldSimulation,
    ) -> Result<(), SubjectError> {
        let colony = simulation
            .as_any_mut()
            .downcast_mut::<ColonySimulation>()
            .ok_or_else(|| SubjectError::new("colony subjects need the colony simulation"))?;
        colony.seed_colony(self.cells, self.seed, self.color);
        Ok(())
    }

    fn state_has_stabilized(&self, simulation: &dyn WorldSimulation) -> bool {
        simulation
            .as_any()
            .downcast_ref::<ColonySimulation>()
            .is_some_and(ColonySimulation::is_settled)
    }

    fn photograph_position(&self, simulation: &dyn WorldSimulation) -> Vec3 {
        let radius = simulation
            .as_any()
            .downcast_ref::<ColonySimulation>()
            .map_or(CELL_RADIUS, ColonySimulation::extent);
        framed_position(radius, self.fov_degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_spec(tint: Option<[u8; 4]>, scale: f32) -> SubjectSpec {
        SubjectSpec::Scene {
            scene: "res://demo/cube.json".to_string(),
            tint,
            scale,
        }
    }

    #[test]
    fn fingerprints_track_visual_parameters() {
        let plain = build_subject(&scene_spec(None, 1.0), 70.0);
        let same = build_subject(&scene_spec(None, 1.0), 70.0);
        let tinted = build_subject(&scene_spec(Some([1, 2, 3, 255]), 1.0), 70.0);
        let scaled = build_subject(&scene_spec(None, 2.0), 70.0);
        assert_eq!(plain.fingerprint(), same.fingerprint());
        assert_ne!(plain.fingerprint(), tinted.fingerprint());
        assert_ne!(plain.fingerprint(), scaled.fingerprint());

        let colony = |seed| {
            build_subject(
                &SubjectSpec::Colony {
                    cells: 5,
                    seed,
                    color: [9, 9, 9, 255],
                },
                70.0,
            )
        };
        assert_eq!(colony(1).fingerprint(), colony(1).fingerprint());
        assert_ne!(colony(1).fingerprint(), colony(2).fingerprint());
    }

    #[test]
    fn tint_and_scale_are_applied_to_the_instanced_scene() {
        let subject = TintedSceneSubject {
            path: "res://demo/cube.json".to_string(),
            tint: Some([7, 8, 9, 255]),
            scale: 2.0,
            fov_degrees: 70.0,
        };
        let mut scene = SceneNode::new("root");
        scene.add_child(SceneNode::new("cube").with_shape(1.0, [0, 0, 0, 255]));
        subject.apply_scene_parameters(&mut scene).expect("apply");

        let shapes = scene.visible_shapes();
        assert_eq!(shapes[0].color, [7, 8, 9, 255]);
        assert_eq!(shapes[0].radius, 2.0);
        let position = subject.photograph_position(&scene);
        assert!((position.z - camera_distance_from_radius(2.0, 70.0)).abs() < 1e-5);
    }

    #[test]
    fn untinted_subject_clears_a_previous_tint() {
        let tinted = TintedSceneSubject {
            path: "res://demo/cube.json".to_string(),
            tint: Some([255, 0, 0, 255]),
            scale: 3.0,
            fov_degrees: 70.0,
        };
        let plain = TintedSceneSubject {
            path: tinted.path.clone(),
            tint: None,
            scale: 1.0,
            fov_degrees: 70.0,
        };
        let mut scene = SceneNode::new("root");
        scene.add_child(SceneNode::new("cube").with_shape(1.0, [255, 255, 255, 255]));

        tinted.apply_scene_parameters(&mut scene).expect("tinted");
        plain.apply_scene_parameters(&mut scene).expect("plain");

        let shapes = scene.visible_shapes();
        assert_eq!(shapes[0].color, [255, 255, 255, 255]);
        assert_eq!(shapes[0].radius, 1.0);
    }

    #[test]
    fn colony_subject_rejects_foreign_simulations() {
        struct Other;
        impl WorldSimulation for Other {
            fn init(&mut self, _root: &mut SceneNode) {}
            fn process_logic(&mut self, _delta: f32) {}
            fn process_all(&mut self, _delta: f32, _root: &mut SceneNode) {}
            fn has_pending_operations(&self) -> bool {
                false
            }
            fn entity_count(&self) -> usize {
                0
            }
            fn destroy_all_entities(&mut self, _root: &mut SceneNode) {}
            fn dispose(&mut self) {}
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let subject = ColonySubject {
            cells: 3,
            seed: 0,
            color: [0, 0, 0, 255],
            fov_degrees: 70.0,
        };
        let mut other = Other;
        assert!(subject.setup_world_entities(&mut other).is_err());
        assert!(!subject.state_has_stabilized(&other));
    }
}

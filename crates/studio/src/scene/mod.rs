mod loader;
mod resource_path;

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

pub use loader::{AssetError, JsonSceneLoader, SceneAsset, SceneLoader};
pub use resource_path::{validate_resource_path, ResourcePathError, RESOURCE_SCHEME};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Drawable sphere attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeShape {
    pub radius: f32,
    /// Colour authored in the scene asset.
    pub color: [u8; 4],
    /// Per-subject override of `color`. Never serialized.
    #[serde(skip)]
    pub tint: Option<[u8; 4]>,
}

impl NodeShape {
    pub fn rendered_color(&self) -> [u8; 4] {
        self.tint.unwrap_or(self.color)
    }
}

/// A shape resolved to world space, as the capture viewport sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldShape {
    pub center: Vec3,
    pub radius: f32,
    pub color: [u8; 4],
}

/// Live scene graph node. Instantiated from a [`SceneAsset`] or built by a
/// world simulation under its root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    #[serde(default)]
    pub translation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub shape: Option<NodeShape>,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

fn default_scale() -> f32 {
    1.0
}

fn default_visible() -> bool {
    true
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: Vec3::ZERO,
            scale: 1.0,
            visible: true,
            shape: None,
            children: Vec::new(),
        }
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_shape(mut self, radius: f32, color: [u8; 4]) -> Self {
        self.shape = Some(NodeShape {
            radius,
            color,
            tint: None,
        });
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// Depth-first search including `self`.
    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut SceneNode> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_mut(name))
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(SceneNode::node_count)
            .sum::<usize>()
    }

    /// Applies `f` to every shape in the subtree.
    pub fn for_each_shape_mut(&mut self, f: &mut impl FnMut(&mut NodeShape)) {
        if let Some(shape) = self.shape.as_mut() {
            f(shape);
        }
        for child in &mut self.children {
            child.for_each_shape_mut(f);
        }
    }

    /// Sets or clears the tint on every shape in the subtree.
    pub fn set_tint(&mut self, tint: Option<[u8; 4]>) {
        self.for_each_shape_mut(&mut |shape| shape.tint = tint);
    }

    /// Radius of the smallest origin-centred sphere enclosing every visible
    /// shape, in the coordinate space of this node's parent.
    pub fn bounding_radius(&self) -> f32 {
        self.visible_shapes()
            .iter()
            .map(|shape| shape.center.length() + shape.radius)
            .fold(0.0, f32::max)
    }

    /// Visible shapes with translation and scale folded down the hierarchy.
    pub fn visible_shapes(&self) -> Vec<WorldShape> {
        let mut shapes = Vec::new();
        self.collect_shapes(Vec3::ZERO, 1.0, &mut shapes);
        shapes
    }

    fn collect_shapes(&self, parent_origin: Vec3, parent_scale: f32, out: &mut Vec<WorldShape>) {
        if !self.visible {
            return;
        }
        let origin = parent_origin + self.translation * parent_scale;
        let scale = parent_scale * self.scale;
        if let Some(shape) = self.shape {
            out.push(WorldShape {
                center: origin,
                radius: shape.radius * scale,
                color: shape.rendered_color(),
            });
        }
        for child in &self.children {
            child.collect_shapes(origin, scale, out);
        }
    }
}

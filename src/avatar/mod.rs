//! Avatar scene model: the parts of a loaded 3D asset that facial animation touches.
//!
//! The renderer owns geometry, materials and skinning. This crate only keeps
//! what it reads or writes each frame: the per-mesh morph target maps and
//! influence arrays, and node rotations (for the head nod).

pub mod glb;
pub mod loader;

pub use loader::{AssetSource, AvatarLoader};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Avatar handle shared between the loader cache and the animator.
pub type SharedScene = Arc<Mutex<AvatarScene>>;

/// Blend-shape name → index into a mesh's influence array.
///
/// Fixed once the asset is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphTargets {
    by_name: HashMap<String, usize>,
    count: usize,
}

impl MorphTargets {
    /// Build a map where each name's index is its position in `names`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut by_name = HashMap::new();
        let mut count = 0;
        for (index, name) in names.into_iter().enumerate() {
            // First occurrence wins, like a dictionary built in declaration order.
            by_name.entry(name.into()).or_insert(index);
            count = index + 1;
        }
        Self { by_name, count }
    }

    /// Capability query: the influence index for `name`, if this mesh has it.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of influence slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Names ordered by influence index.
    pub fn names(&self) -> Vec<&str> {
        let mut pairs: Vec<(&str, usize)> =
            self.by_name.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        pairs.sort_by_key(|(_, index)| *index);
        pairs.into_iter().map(|(name, _)| name).collect()
    }
}

/// A node that carries a mesh with blend shapes.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub name: String,
    pub morph_targets: MorphTargets,
    /// Current weights, one per morph target, each in \[0, 1\].
    pub influences: Vec<f32>,
}

impl MeshNode {
    /// Mesh node with all influences at rest.
    pub fn new<I, S>(name: impl Into<String>, target_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let morph_targets = MorphTargets::new(target_names);
        let influences = vec![0.0; morph_targets.len()];
        Self {
            name: name.into(),
            morph_targets,
            influences,
        }
    }

    /// Current weight of the named blend shape.
    pub fn influence(&self, name: &str) -> Option<f32> {
        self.morph_targets
            .index_of(name)
            .and_then(|index| self.influences.get(index).copied())
    }

    /// Write a weight by index. Out-of-range indices are ignored.
    pub fn set_influence_at(&mut self, index: usize, value: f32) {
        if let Some(slot) = self.influences.get_mut(index) {
            *slot = value;
        }
    }
}

/// Euler rotation in radians (XYZ order).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Convert a glTF `[x, y, z, w]` unit quaternion to XYZ Euler angles.
    pub fn from_quaternion([x, y, z, w]: [f32; 4]) -> Self {
        let m11 = 1.0 - 2.0 * (y * y + z * z);
        let m12 = 2.0 * (x * y - w * z);
        let m13 = 2.0 * (x * z + w * y);
        let m22 = 1.0 - 2.0 * (x * x + z * z);
        let m23 = 2.0 * (y * z - w * x);
        let m32 = 2.0 * (y * z + w * x);
        let m33 = 1.0 - 2.0 * (x * x + y * y);

        let yaw = m13.clamp(-1.0, 1.0).asin();
        if m13.abs() < 0.999_999_9 {
            Self {
                pitch: (-m23).atan2(m33),
                yaw,
                roll: (-m12).atan2(m11),
            }
        } else {
            // Gimbal lock: roll folds into pitch.
            Self {
                pitch: m32.atan2(m22),
                yaw,
                roll: 0.0,
            }
        }
    }
}

/// A transform node (bone or group) that may be rotated.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub rest_rotation: Rotation,
    pub rotation: Rotation,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, rest_rotation: Rotation) -> Self {
        Self {
            name: name.into(),
            rest_rotation,
            rotation: rest_rotation,
        }
    }
}

/// The mutable view of a loaded avatar.
#[derive(Debug, Clone, Default)]
pub struct AvatarScene {
    pub meshes: Vec<MeshNode>,
    pub nodes: Vec<SceneNode>,
}

impl AvatarScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh(mut self, mesh: MeshNode) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_node(mut self, node: SceneNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn mesh(&self, name: &str) -> Option<&MeshNode> {
        self.meshes.iter().find(|m| m.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Wrap in the shared handle used by the loader and the animator.
    pub fn into_shared(self) -> SharedScene {
        Arc::new(Mutex::new(self))
    }
}

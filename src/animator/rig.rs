//! Facial controls resolved against a loaded scene.
//!
//! Each capability (blink, mouth, gaze, head) is looked up by name once at load
//! time. A control with no matching slot resolves to an empty list, so writing
//! to it later does nothing.

use crate::avatar::AvatarScene;
use crate::config::AvatarAssetConfig;
use tracing::{debug, info};

/// One morph influence slot: mesh index and influence index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphSlot {
    pub mesh: usize,
    pub index: usize,
}

/// Gaze slots per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GazeSlots {
    pub left: Vec<MorphSlot>,
    pub right: Vec<MorphSlot>,
    pub up: Vec<MorphSlot>,
    pub down: Vec<MorphSlot>,
}

/// Resolved facial controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceRig {
    pub blink: Vec<MorphSlot>,
    pub mouth: Vec<MorphSlot>,
    pub gaze: GazeSlots,
    /// Index into `AvatarScene::nodes` of the head.
    pub head: Option<usize>,
}

impl FaceRig {
    /// Resolve every control named in `names` against `scene`.
    pub fn resolve(scene: &AvatarScene, names: &AvatarAssetConfig) -> Self {
        let blink = names
            .blink_targets
            .iter()
            .flat_map(|target| slots_for(scene, target))
            .collect();
        let rig = Self {
            blink,
            mouth: slots_for(scene, &names.mouth_target),
            gaze: GazeSlots {
                left: slots_for(scene, &names.gaze_targets.left),
                right: slots_for(scene, &names.gaze_targets.right),
                up: slots_for(scene, &names.gaze_targets.up),
                down: slots_for(scene, &names.gaze_targets.down),
            },
            head: scene.node_index(&names.head_node),
        };

        info!(
            "face rig: {} blink, {} mouth, {} gaze slots, head {}",
            rig.blink.len(),
            rig.mouth.len(),
            rig.gaze.left.len() + rig.gaze.right.len() + rig.gaze.up.len() + rig.gaze.down.len(),
            if rig.head.is_some() { "found" } else { "missing" }
        );
        rig
    }
}

/// Every mesh that has `target`, with its influence index.
fn slots_for(scene: &AvatarScene, target: &str) -> Vec<MorphSlot> {
    let slots: Vec<MorphSlot> = scene
        .meshes
        .iter()
        .enumerate()
        .filter_map(|(mesh, node)| {
            node.morph_targets
                .index_of(target)
                .map(|index| MorphSlot { mesh, index })
        })
        .collect();
    if slots.is_empty() {
        debug!("no mesh has blend shape {target}");
    }
    slots
}

//! Facial animation: blink and nod pulses, lip-sync and gaze.
//!
//! Callers express intents ([`FacialAnimator::set_blink`],
//! [`FacialAnimator::set_nod`], [`FacialAnimator::set_mouth_open`],
//! [`FacialAnimator::set_gaze`]); [`FacialAnimator::tick`] turns them into morph
//! influence and head rotation writes once per animation frame. The animator
//! is the only writer of those fields.

pub mod idle;
pub mod pulse;
pub mod rig;

pub use idle::IdleBehaviour;
pub use pulse::{Pulse, blink_weight, nod_offset};
pub use rig::{FaceRig, MorphSlot};

use crate::avatar::{AvatarScene, SharedScene};
use crate::clock::Clock;
use crate::config::{AnimationConfig, AvatarAssetConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Drives the face of one avatar.
pub struct FacialAnimator {
    scene: SharedScene,
    rig: FaceRig,
    clock: Arc<dyn Clock>,
    blink_duration: Duration,
    nod_duration: Duration,
    nod_amplitude: f32,
    blink: Option<Pulse>,
    nod: Option<Pulse>,
    mouth_open: f32,
    gaze: (f32, f32),
}

impl FacialAnimator {
    /// Resolve the face rig against `scene` and start at rest.
    pub fn new(
        scene: SharedScene,
        names: &AvatarAssetConfig,
        animation: &AnimationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rig = match scene.lock() {
            Ok(guard) => FaceRig::resolve(&guard, names),
            Err(_) => {
                warn!("avatar scene lock poisoned, facial animation disabled");
                FaceRig::default()
            }
        };
        Self {
            scene,
            rig,
            clock,
            blink_duration: animation.blink_duration(),
            nod_duration: animation.nod_duration(),
            nod_amplitude: animation.nod_amplitude,
            blink: None,
            nod: None,
            mouth_open: 0.0,
            gaze: (0.0, 0.0),
        }
    }

    /// Start a blink unless one is already running.
    pub fn set_blink(&mut self, active: bool) {
        if active && self.blink.is_none() {
            self.blink = Some(Pulse::new(self.clock.now(), self.blink_duration));
        }
    }

    /// Start a nod unless one is already running.
    pub fn set_nod(&mut self, active: bool) {
        if active && self.nod.is_none() {
            self.nod = Some(Pulse::new(self.clock.now(), self.nod_duration));
        }
    }

    /// Set the mouth-open weight applied to every mouth slot.
    pub fn set_mouth_open(&mut self, amount: f32) {
        self.mouth_open = if amount.is_finite() {
            amount.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Set the gaze direction; positive x looks left, positive y looks up.
    pub fn set_gaze(&mut self, x: f32, y: f32) {
        let clamp = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        self.gaze = (clamp(x), clamp(y));
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_some()
    }

    pub fn is_nodding(&self) -> bool {
        self.nod.is_some()
    }

    pub fn mouth_open(&self) -> f32 {
        self.mouth_open
    }

    pub fn gaze(&self) -> (f32, f32) {
        self.gaze
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Apply the current intents to the scene. Call once per frame.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        // Completed pulses write their rest value one last time, then clear.
        let blink = match self.blink {
            Some(pulse) if pulse.is_complete(now) => {
                self.blink = None;
                Some(0.0)
            }
            Some(pulse) => Some(blink_weight(pulse.progress(now))),
            None => None,
        };
        let nod = match self.nod {
            Some(pulse) if pulse.is_complete(now) => {
                self.nod = None;
                Some(0.0)
            }
            Some(pulse) => Some(nod_offset(pulse.progress(now), self.nod_amplitude)),
            None => None,
        };

        let Ok(mut scene) = self.scene.lock() else {
            warn!("avatar scene lock poisoned, skipping frame");
            return;
        };

        if let Some(weight) = blink {
            write_slots(&mut scene, &self.rig.blink, weight);
        }
        if let (Some(offset), Some(head)) = (nod, self.rig.head)
            && let Some(node) = scene.nodes.get_mut(head)
        {
            node.rotation = node.rest_rotation;
            node.rotation.pitch += offset;
        }

        write_slots(&mut scene, &self.rig.mouth, self.mouth_open);

        let (x, y) = self.gaze;
        write_slots(&mut scene, &self.rig.gaze.left, x.max(0.0));
        write_slots(&mut scene, &self.rig.gaze.right, (-x).max(0.0));
        write_slots(&mut scene, &self.rig.gaze.up, y.max(0.0));
        write_slots(&mut scene, &self.rig.gaze.down, (-y).max(0.0));
    }
}

fn write_slots(scene: &mut AvatarScene, slots: &[MorphSlot], value: f32) {
    for slot in slots {
        if let Some(mesh) = scene.meshes.get_mut(slot.mesh) {
            mesh.set_influence_at(slot.index, value);
        }
    }
}

//! Idle liveliness: eyes that wander, blinks nobody asked for, and a mouth
//! that twitches while nobody is talking.

use crate::animator::FacialAnimator;
use crate::config::IdleConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_GAZE_RANGE: f32 = 0.2;
const DEFAULT_MOUTH_MAX: f32 = 0.8;

/// Schedules random gaze changes, idle blinks and idle mouth movement.
pub struct IdleBehaviour {
    config: IdleConfig,
    gaze_range: f32,
    mouth_max: f32,
    rng: StdRng,
    next_gaze: Option<Instant>,
    next_blink: Option<Instant>,
    next_mouth: Option<Instant>,
    mouth_open_until: Option<Instant>,
}

impl IdleBehaviour {
    pub fn new(config: &IdleConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config: config.clone(),
            gaze_range: unit_or(config.gaze_range, DEFAULT_GAZE_RANGE, "idle.gaze_range"),
            mouth_max: unit_or(config.mouth_max, DEFAULT_MOUTH_MAX, "idle.mouth_max"),
            rng,
            next_gaze: None,
            next_blink: None,
            next_mouth: None,
            mouth_open_until: None,
        }
    }

    /// Fire whatever is due at `now` on `animator`, and schedule the next one.
    ///
    /// The mouth only moves while `conversation_idle`; an idle movement still
    /// open when the conversation starts is closed at once.
    pub fn update(
        &mut self,
        now: Instant,
        animator: &mut FacialAnimator,
        conversation_idle: bool,
    ) {
        if self.config.gaze_enabled {
            match self.next_gaze {
                None => {
                    self.next_gaze = Some(now + self.gaze_interval());
                }
                Some(due) if now >= due => {
                    let range = self.gaze_range;
                    let x = self.rng.gen_range(-range..=range);
                    let y = self.rng.gen_range(-range..=range);
                    animator.set_gaze(x, y);
                    self.next_gaze = Some(now + self.gaze_interval());
                }
                Some(_) => {}
            }
        }

        if self.config.blink_enabled {
            match self.next_blink {
                None => {
                    self.next_blink = Some(now + self.blink_interval());
                }
                Some(due) if now >= due => {
                    animator.set_blink(true);
                    self.next_blink = Some(now + self.blink_interval());
                }
                Some(_) => {}
            }
        }

        if self.config.mouth_enabled {
            self.update_mouth(now, animator, conversation_idle);
        }
    }

    /// Whether an idle mouth movement is currently holding the mouth open.
    pub fn is_mouth_open(&self) -> bool {
        self.mouth_open_until.is_some()
    }

    fn update_mouth(
        &mut self,
        now: Instant,
        animator: &mut FacialAnimator,
        conversation_idle: bool,
    ) {
        if !conversation_idle {
            if self.mouth_open_until.take().is_some() {
                animator.set_mouth_open(0.0);
            }
            self.next_mouth = None;
            return;
        }

        if let Some(until) = self.mouth_open_until
            && now >= until
        {
            animator.set_mouth_open(0.0);
            self.mouth_open_until = None;
        }

        let interval = Duration::from_millis(self.config.mouth_interval_ms.max(1));
        match self.next_mouth {
            None => {
                self.next_mouth = Some(now + interval);
            }
            Some(due) if now >= due => {
                let amount = self.rng.gen_range(0.0..=self.mouth_max);
                animator.set_mouth_open(amount);
                let hold = Duration::from_millis(self.config.mouth_hold_ms);
                self.mouth_open_until = Some(now + hold);
                self.next_mouth = Some(now + interval);
            }
            Some(_) => {}
        }
    }

    fn gaze_interval(&mut self) -> Duration {
        let (lo, hi) = ordered(
            self.config.gaze_min_interval_ms,
            self.config.gaze_max_interval_ms,
        );
        Duration::from_millis(self.rng.gen_range(lo..=hi))
    }

    fn blink_interval(&mut self) -> Duration {
        let (lo, hi) = ordered(
            self.config.blink_min_interval_ms,
            self.config.blink_max_interval_ms,
        );
        Duration::from_millis(self.rng.gen_range(lo..=hi))
    }
}

fn ordered(a: u64, b: u64) -> (u64, u64) {
    (a.min(b), a.max(b))
}

/// `value` as a magnitude in [0, 1], or `fallback` when it is not a number.
fn unit_or(value: f32, fallback: f32, name: &str) -> f32 {
    if value.is_finite() {
        value.abs().min(1.0)
    } else {
        warn!("{name} = {value} is not finite, using {fallback}");
        fallback
    }
}

//! Time-bounded animation pulses and their progress curves.

use std::time::{Duration, Instant};

/// A pulse that runs once from `started_at` for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    started_at: Instant,
    duration: Duration,
}

impl Pulse {
    pub fn new(started_at: Instant, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
        }
    }

    /// Fraction of the pulse elapsed at `now`, clamped to \[0, 1\].
    ///
    /// A zero-length pulse is complete immediately.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// Triangular blink curve: 0 → 1 over the first half, 1 → 0 over the second.
pub fn blink_weight(progress: f32) -> f32 {
    let p = progress.clamp(0.0, 1.0);
    if p >= 1.0 {
        return 0.0;
    }
    if p <= 0.5 { p * 2.0 } else { (1.0 - p) * 2.0 }
}

/// Nod pitch offset: `amplitude * sin(progress * π)`, exactly 0 at both ends.
pub fn nod_offset(progress: f32, amplitude: f32) -> f32 {
    if progress <= 0.0 || progress >= 1.0 {
        return 0.0;
    }
    amplitude * (progress * std::f32::consts::PI).sin()
}

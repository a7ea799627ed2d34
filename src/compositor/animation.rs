//! Minimize / restore animations
//!
//! At most one animation runs per window. Interpolation is linear in time
//! with progress clamped to [0, 1]; a finished animation is dropped and its
//! end rectangle handed back to the caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::shared::{Geometry, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Minimize,
    Restore,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    pub kind: AnimationKind,
    pub start_rect: Geometry,
    pub end_rect: Geometry,
    pub start_time: Instant,
    pub duration: Duration,
    pub fade: bool,
}

impl Animation {
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Minimize fades out, restore fades in. A generic transition fades
    /// out when it shrinks and in when it grows.
    fn fades_out(&self) -> bool {
        match self.kind {
            AnimationKind::Minimize => true,
            AnimationKind::Restore => false,
            AnimationKind::Transition => self.end_rect.area() < self.start_rect.area(),
        }
    }

    pub fn opacity(&self, progress: f64) -> f32 {
        if !self.fade {
            return 1.0;
        }
        let p = progress.clamp(0.0, 1.0) as f32;
        if self.fades_out() { 1.0 - p } else { p }
    }
}

/// Interpolated state for one window at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationFrame {
    pub rect: Geometry,
    pub opacity: f32,
    pub finished: bool,
}

#[derive(Debug, Default)]
pub struct AnimationEngine {
    running: HashMap<WindowId, Animation>,
    /// Waiting for their window to be mapped; the clock has not started
    deferred: HashMap<WindowId, Animation>,
}

impl AnimationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an animation, replacing any running one for the window
    pub fn start(
        &mut self,
        window: WindowId,
        kind: AnimationKind,
        start_rect: Geometry,
        end_rect: Geometry,
        duration: Duration,
        fade: bool,
        now: Instant,
    ) {
        self.deferred.remove(&window);
        let previous = self.running.insert(
            window,
            Animation {
                kind,
                start_rect,
                end_rect,
                start_time: now,
                duration,
                fade,
            },
        );
        if previous.is_some() {
            debug!("Replaced running animation of window {:#x}", window);
        }
        debug!(
            "Animating window {:#x} {:?}: {:?} -> {:?} over {:?}",
            window, kind, start_rect, end_rect, duration
        );
    }

    /// Park an animation for a window that is not shown yet. `resume`
    /// starts its clock. Replaces anything running or parked for the window.
    pub fn defer(
        &mut self,
        window: WindowId,
        kind: AnimationKind,
        start_rect: Geometry,
        end_rect: Geometry,
        duration: Duration,
        fade: bool,
        now: Instant,
    ) {
        self.running.remove(&window);
        self.deferred.insert(
            window,
            Animation {
                kind,
                start_rect,
                end_rect,
                start_time: now,
                duration,
                fade,
            },
        );
        debug!("Deferred {:?} animation of unmapped window {:#x}", kind, window);
    }

    /// Start a parked animation as of `now`
    pub fn resume(&mut self, window: WindowId, now: Instant) -> bool {
        match self.deferred.remove(&window) {
            Some(animation) => {
                self.running.insert(
                    window,
                    Animation {
                        start_time: now,
                        ..animation
                    },
                );
                true
            }
            None => false,
        }
    }

    pub fn is_deferred(&self, window: WindowId) -> bool {
        self.deferred.contains_key(&window)
    }

    pub fn cancel(&mut self, window: WindowId) -> bool {
        let deferred = self.deferred.remove(&window).is_some();
        self.running.remove(&window).is_some() || deferred
    }

    pub fn clear(&mut self) {
        self.running.clear();
        self.deferred.clear();
    }

    /// Drop running animations whose window fails `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(WindowId) -> bool) {
        self.running.retain(|&window, _| {
            let kept = keep(window);
            if !kept {
                debug!("Dropping animation of hidden window {:#x}", window);
            }
            kept
        });
    }

    pub fn is_running(&self, window: WindowId) -> bool {
        self.running.contains_key(&window)
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn get(&self, window: WindowId) -> Option<&Animation> {
        self.running.get(&window)
    }

    /// Interpolated rect/opacity without advancing state
    pub fn sample(&self, window: WindowId, now: Instant) -> Option<AnimationFrame> {
        let animation = self.running.get(&window)?;
        let progress = animation.progress(now);
        Some(AnimationFrame {
            rect: animation.start_rect.lerp(&animation.end_rect, progress),
            opacity: animation.opacity(progress),
            finished: progress >= 1.0,
        })
    }

    /// Sample and drop the animation if it has completed. A finished frame
    /// carries exactly the end rectangle.
    pub fn advance(&mut self, window: WindowId, now: Instant) -> Option<AnimationFrame> {
        let frame = self.sample(window, now)?;
        if frame.finished {
            if let Some(done) = self.running.remove(&window) {
                debug!("Animation of window {:#x} finished", window);
                return Some(AnimationFrame {
                    rect: done.end_rect,
                    opacity: done.opacity(1.0),
                    finished: true,
                });
            }
        }
        Some(frame)
    }
}

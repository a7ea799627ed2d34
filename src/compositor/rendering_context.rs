//! Scoped damage notification for decoration drawing
//!
//! A [`RenderingContext`] wraps a block of drawing into one window. When the
//! context ends, explicitly or by being dropped on any exit path, the
//! compositor receives exactly one notification per damaged region.

use tracing::trace;

use crate::shared::{Geometry, WindowId};

/// Receiver of "these pixels changed" notifications
pub trait DamageSink {
    /// `region` is window-relative; `None` means the whole window
    fn notify_rendering_complete(&mut self, window: WindowId, region: Option<Geometry>);
}

pub struct RenderingContext<'a> {
    sink: &'a mut dyn DamageSink,
    window: WindowId,
    regions: Vec<Geometry>,
    whole_window: bool,
    active: bool,
}

impl<'a> RenderingContext<'a> {
    /// Begin rendering into the whole window
    pub fn new(sink: &'a mut dyn DamageSink, window: WindowId) -> Self {
        trace!("Rendering context opened for window {:#x}", window);
        Self {
            sink,
            window,
            regions: Vec::new(),
            whole_window: true,
            active: true,
        }
    }

    /// Begin rendering into one region of the window
    pub fn with_region(sink: &'a mut dyn DamageSink, window: WindowId, region: Geometry) -> Self {
        let mut ctx = Self::new(sink, window);
        ctx.whole_window = false;
        ctx.regions.push(region);
        ctx
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mark an additional region as damaged. Narrows a whole-window context
    /// to the regions added.
    pub fn add_damage_rect(&mut self, rect: Geometry) {
        self.whole_window = false;
        if !self.regions.contains(&rect) {
            self.regions.push(rect);
        }
    }

    /// End rendering and notify the compositor
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if self.whole_window || self.regions.is_empty() {
            self.sink.notify_rendering_complete(self.window, None);
        } else {
            for region in self.regions.drain(..) {
                self.sink.notify_rendering_complete(self.window, Some(region));
            }
        }
    }
}

impl Drop for RenderingContext<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// One-shot notification for drawing that needed no scope
pub fn notify_rendering_complete(sink: &mut dyn DamageSink, window: WindowId, region: Option<Geometry>) {
    let ctx = match region {
        Some(rect) => RenderingContext::with_region(sink, window, rect),
        None => RenderingContext::new(sink, window),
    };
    ctx.end();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        notifications: Vec<(WindowId, Option<Geometry>)>,
    }

    impl DamageSink for Recorder {
        fn notify_rendering_complete(&mut self, window: WindowId, region: Option<Geometry>) {
            self.notifications.push((window, region));
        }
    }

    #[test]
    fn test_explicit_end_notifies_once() {
        let mut recorder = Recorder::default();
        let ctx = RenderingContext::new(&mut recorder, 5);
        ctx.end();
        assert_eq!(recorder.notifications, vec![(5, None)]);
    }

    #[test]
    fn test_drop_notifies_on_early_return() {
        fn draw(sink: &mut dyn DamageSink) -> Result<(), &'static str> {
            let mut ctx = RenderingContext::with_region(sink, 9, Geometry::new(0, 0, 100, 20));
            ctx.add_damage_rect(Geometry::new(80, 2, 16, 16));
            if ctx.window() == 9 {
                return Err("font missing");
            }
            ctx.end();
            Ok(())
        }

        let mut recorder = Recorder::default();
        assert!(draw(&mut recorder).is_err());
        assert_eq!(
            recorder.notifications,
            vec![
                (9, Some(Geometry::new(0, 0, 100, 20))),
                (9, Some(Geometry::new(80, 2, 16, 16))),
            ]
        );
    }

    #[test]
    fn test_duplicate_regions_notify_once() {
        let mut recorder = Recorder::default();
        {
            let mut ctx = RenderingContext::new(&mut recorder, 3);
            ctx.add_damage_rect(Geometry::new(0, 0, 10, 10));
            ctx.add_damage_rect(Geometry::new(0, 0, 10, 10));
        }
        assert_eq!(recorder.notifications, vec![(3, Some(Geometry::new(0, 0, 10, 10)))]);
    }

    #[test]
    fn test_one_shot_helper() {
        let mut recorder = Recorder::default();
        notify_rendering_complete(&mut recorder, 4, None);
        notify_rendering_complete(&mut recorder, 4, Some(Geometry::new(1, 1, 2, 2)));
        assert_eq!(
            recorder.notifications,
            vec![(4, None), (4, Some(Geometry::new(1, 1, 2, 2)))]
        );
    }
}

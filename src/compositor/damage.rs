//! Damage bookkeeping
//!
//! Accumulates damaged regions per window plus the dirty-stacking flag.
//! Pure bookkeeping: nothing in here talks to the X server.

use std::collections::HashMap;

use crate::shared::{Geometry, WindowId};

/// Accumulated damage of one window
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DamageRegion {
    #[default]
    Clean,
    /// Window-relative rectangles, none containing another
    Partial(Vec<Geometry>),
    Whole,
}

impl DamageRegion {
    pub fn is_damaged(&self) -> bool {
        !matches!(self, DamageRegion::Clean)
    }

    /// Merge one rectangle. Once more than `budget` rectangles would be kept
    /// the region degrades to the whole window.
    fn add(&mut self, rect: Geometry, budget: usize) {
        if rect.is_empty() {
            return;
        }
        match self {
            DamageRegion::Whole => {}
            DamageRegion::Clean => *self = DamageRegion::Partial(vec![rect]),
            DamageRegion::Partial(rects) => {
                if rects.iter().any(|r| r.contains(&rect)) {
                    return;
                }
                rects.retain(|r| !rect.contains(r));
                rects.push(rect);
                if rects.len() > budget {
                    *self = DamageRegion::Whole;
                }
            }
        }
    }

    /// Bounding box of the damage, `window` being the window's own geometry
    pub fn extents(&self, window: &Geometry) -> Option<Geometry> {
        match self {
            DamageRegion::Clean => None,
            DamageRegion::Whole => Some(Geometry::new(0, 0, window.width, window.height)),
            DamageRegion::Partial(rects) => rects.iter().copied().reduce(|a, b| a.union(&b)),
        }
    }
}

/// Per-window damage plus the dirty-stacking flag
#[derive(Debug)]
pub struct DamageTracker {
    windows: HashMap<WindowId, DamageRegion>,
    stacking_dirty: bool,
    region_budget: usize,
}

impl DamageTracker {
    pub fn new(region_budget: usize) -> Self {
        Self {
            windows: HashMap::new(),
            stacking_dirty: false,
            region_budget: region_budget.max(1),
        }
    }

    /// Start tracking a window. New windows start fully damaged.
    pub fn track(&mut self, window: WindowId) {
        self.windows.insert(window, DamageRegion::Whole);
    }

    pub fn forget(&mut self, window: WindowId) {
        self.windows.remove(&window);
    }

    /// Merge a reported sub-region; `None` damages the whole window.
    /// Untracked windows are ignored.
    pub fn add(&mut self, window: WindowId, area: Option<Geometry>) {
        let budget = self.region_budget;
        if let Some(region) = self.windows.get_mut(&window) {
            match area {
                Some(rect) => region.add(rect, budget),
                None => *region = DamageRegion::Whole,
            }
        }
    }

    pub fn damage_whole(&mut self, window: WindowId) {
        self.add(window, None);
    }

    pub fn clear(&mut self, window: WindowId) {
        if let Some(region) = self.windows.get_mut(&window) {
            *region = DamageRegion::Clean;
        }
    }

    pub fn is_damaged(&self, window: WindowId) -> bool {
        self.windows
            .get(&window)
            .map(DamageRegion::is_damaged)
            .unwrap_or(false)
    }

    pub fn region(&self, window: WindowId) -> Option<&DamageRegion> {
        self.windows.get(&window)
    }

    pub fn any_damaged(&self) -> bool {
        self.windows.values().any(DamageRegion::is_damaged)
    }

    pub fn mark_stacking_dirty(&mut self) {
        self.stacking_dirty = true;
    }

    pub fn stacking_dirty(&self) -> bool {
        self.stacking_dirty
    }

    /// Consume the dirty-stacking flag
    pub fn take_stacking_dirty(&mut self) -> bool {
        std::mem::take(&mut self.stacking_dirty)
    }

    pub fn reset(&mut self) {
        self.windows.clear();
        self.stacking_dirty = false;
    }
}

use crate::compositor::backend::{DamageHandle, Surface};
use crate::shared::{Geometry, WindowId};

/// Compositor window state
/// Represents a window being painted by the compositing manager
#[derive(Debug)]
pub struct WindowCompositeEntry {
    /// X11 window handle
    pub id: WindowId,

    /// Where the window is drawn. Follows the server configuration, except
    /// that a finished animation leaves it at the animation's end rect.
    pub geometry: Geometry,

    /// Outer geometry mirrored from the last known configuration; the
    /// surface is always sized to this
    pub server_geometry: Geometry,

    /// Is the window mapped?
    pub mapped: bool,

    /// Window opacity (0.0 - 1.0)
    pub opacity: f32,

    /// Off-screen surface, `None` until (re)acquired
    pub(crate) surface: Option<Surface>,

    /// Damage object for change tracking
    pub(crate) damage: Option<DamageHandle>,
}

impl WindowCompositeEntry {
    pub fn new(id: WindowId, geometry: Geometry, mapped: bool) -> Self {
        Self {
            id,
            geometry,
            server_geometry: geometry,
            mapped,
            opacity: 1.0,
            surface: None,
            damage: None,
        }
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// True when a surface is held and its size matches the server geometry
    pub fn surface_is_current(&self) -> bool {
        self.surface
            .map(|s| s.width == self.server_geometry.width && s.height == self.server_geometry.height)
            .unwrap_or(false)
    }
}

//! Display connection contract
//!
//! Everything the compositor needs from the X server, expressed as a trait so
//! the orchestration logic can run against the real connection
//! ([`crate::compositor::x11::X11Backend`]) or a recording double in tests.

use crate::compositor::error::CompositorResult;
use crate::shared::{Geometry, WindowId};

/// Damage object created for a window
pub type DamageHandle = u32;

/// Negotiated extension versions and event offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub composite_version: (u32, u32),
    pub damage_version: (u32, u32),
    pub render_version: (u32, u32),
    /// First event code of the Damage extension
    pub damage_event_base: u8,
    /// First error code of the Damage extension
    pub damage_error_base: u8,
}

/// Attributes read when a window is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub geometry: Geometry,
    pub viewable: bool,
}

/// Off-screen copy of a window plus the picture used to paint it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub pixmap: u32,
    pub picture: u32,
    pub width: u32,
    pub height: u32,
}

/// Root composite target: the overlay window and the back buffer painted
/// into before presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootTarget {
    pub overlay: u32,
    pub overlay_picture: u32,
    pub buffer: u32,
    pub buffer_picture: u32,
    pub width: u32,
    pub height: u32,
}

/// Read-only source of truth for the window Z-order
pub trait StackingSource {
    /// Current stacking order, back-to-front (bottom to top)
    fn stacking_order(&self) -> CompositorResult<Vec<WindowId>>;
}

/// Display connection used by the compositing manager.
///
/// `release_*`/`destroy_*` calls are best-effort: the resource may already be
/// gone server-side and there is nothing useful to do about a failure.
pub trait DisplayBackend: StackingSource {
    /// Probe Composite, Damage, Render and XFixes
    fn query_extensions(&mut self) -> CompositorResult<ExtensionInfo>;

    /// Redirect all top-level windows to off-screen storage
    fn redirect_windows(&mut self) -> CompositorResult<()>;
    fn unredirect_windows(&mut self);

    fn create_root_target(&mut self) -> CompositorResult<RootTarget>;
    fn destroy_root_target(&mut self, target: RootTarget);

    fn window_attributes(&mut self, window: WindowId) -> CompositorResult<WindowAttributes>;

    fn create_damage(&mut self, window: WindowId) -> CompositorResult<DamageHandle>;
    fn destroy_damage(&mut self, damage: DamageHandle);
    /// Acknowledge reported damage so the server reports further changes
    fn subtract_damage(&mut self, damage: DamageHandle) -> CompositorResult<()>;

    /// Name the window's off-screen pixmap and bind a picture to it
    fn acquire_surface(&mut self, window: WindowId, geometry: &Geometry) -> CompositorResult<Surface>;
    fn release_surface(&mut self, surface: Surface);

    /// Drop any per-window state the backend cached; the window is gone
    fn forget_window(&mut self, _window: WindowId) {}

    /// Clear the back buffer to the background
    fn begin_frame(&mut self, target: &RootTarget) -> CompositorResult<()>;
    /// Blend `surface` onto the back buffer, scaled to `dest`
    fn paint(
        &mut self,
        target: &RootTarget,
        surface: &Surface,
        dest: &Geometry,
        opacity: f32,
    ) -> CompositorResult<()>;
    /// Copy the back buffer to the screen
    fn present(&mut self, target: &RootTarget) -> CompositorResult<()>;
}

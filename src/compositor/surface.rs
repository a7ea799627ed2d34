//! Surface cache
//!
//! Acquires and releases the off-screen pixmap + picture bound to each
//! window. A surface is only ever handed to the painter when its size
//! matches the entry's server geometry; the painter scales it to wherever
//! the window is drawn.

use tracing::{debug, trace};

use crate::compositor::backend::DisplayBackend;
use crate::compositor::entry::WindowCompositeEntry;
use crate::compositor::error::{CompositorError, CompositorResult};
use crate::shared::Geometry;

#[derive(Debug, Default)]
pub struct SurfaceCache {
    live: usize,
}

impl SurfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surfaces currently held across all entries
    pub fn live(&self) -> usize {
        self.live
    }

    /// Make sure `entry` holds a surface sized to its server geometry.
    /// Idempotent while the surface is valid.
    pub fn acquire<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        entry: &mut WindowCompositeEntry,
    ) -> CompositorResult<()> {
        if entry.surface_is_current() {
            return Ok(());
        }
        // Stale size: never paint it
        self.invalidate(backend, entry);

        let size = entry.server_geometry;
        if size.is_empty() {
            return Err(CompositorError::Window {
                window: entry.id,
                reason: "zero-sized window has no surface".into(),
            });
        }

        let surface = backend.acquire_surface(entry.id, &size)?;
        if surface.width != size.width || surface.height != size.height {
            backend.release_surface(surface);
            return Err(CompositorError::SurfaceSizeMismatch {
                window: entry.id,
                expected: size,
                actual_width: surface.width,
                actual_height: surface.height,
            });
        }

        trace!(
            "Acquired surface {:#x} for window {:#x} ({}x{})",
            surface.picture, entry.id, surface.width, surface.height
        );
        entry.surface = Some(surface);
        self.live += 1;
        Ok(())
    }

    /// Release the surface, keeping the entry
    pub fn invalidate<B: DisplayBackend>(&mut self, backend: &mut B, entry: &mut WindowCompositeEntry) {
        if let Some(surface) = entry.surface.take() {
            debug!("Invalidating surface of window {:#x}", entry.id);
            backend.release_surface(surface);
            self.live = self.live.saturating_sub(1);
        }
    }

    /// Apply a configuration from the server. A size change releases the
    /// surface in the same step so geometry and surface never describe
    /// different sizes. Returns true if the surface was invalidated.
    pub fn apply_geometry<B: DisplayBackend>(
        &mut self,
        backend: &mut B,
        entry: &mut WindowCompositeEntry,
        geometry: Geometry,
    ) -> bool {
        let resized = !entry.server_geometry.same_size(&geometry);
        entry.server_geometry = geometry;
        entry.geometry = geometry;
        if resized && entry.has_surface() {
            self.invalidate(backend, entry);
            return true;
        }
        false
    }

    /// Forget the surface without talking to the server. Used after the
    /// connection state is already gone.
    pub fn drop_without_release(&mut self, entry: &mut WindowCompositeEntry) {
        if entry.surface.take().is_some() {
            self.live = self.live.saturating_sub(1);
        }
    }

    pub fn reset(&mut self) {
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::testing::MockBackend;

    const WIN: u32 = 0x400001;

    fn setup() -> (MockBackend, WindowCompositeEntry) {
        let backend = MockBackend::new();
        let geometry = Geometry::new(10, 10, 120, 80);
        backend.state.borrow_mut().add_window(WIN, geometry, true);
        (backend, WindowCompositeEntry::new(WIN, geometry, true))
    }

    #[test]
    fn test_surface_follows_server_size_not_drawn_rect() {
        let (mut backend, mut entry) = setup();
        let mut cache = SurfaceCache::new();

        entry.geometry = Geometry::new(0, 0, 0, 0);
        cache.acquire(&mut backend, &mut entry).unwrap();
        let surface = *entry.surface().unwrap();
        assert_eq!((surface.width, surface.height), (120, 80));

        cache.acquire(&mut backend, &mut entry).unwrap();
        assert_eq!(entry.surface(), Some(&surface));
        assert_eq!(cache.live(), 1);
    }

    #[test]
    fn test_server_resize_invalidates() {
        let (mut backend, mut entry) = setup();
        let mut cache = SurfaceCache::new();
        cache.acquire(&mut backend, &mut entry).unwrap();

        assert!(!cache.apply_geometry(&mut backend, &mut entry, Geometry::new(40, 40, 120, 80)));
        assert!(entry.has_surface());

        let resized = Geometry::new(40, 40, 60, 60);
        assert!(cache.apply_geometry(&mut backend, &mut entry, resized));
        assert!(!entry.has_surface());
        assert_eq!(entry.geometry, resized);
        assert_eq!(entry.server_geometry, resized);
        assert_eq!(cache.live(), 0);
    }
}

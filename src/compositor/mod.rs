//! Compositor Module
//!
//! XRender compositing manager: keeps an off-screen surface per managed
//! window, tracks damage, and composites the screen back-to-front on a
//! throttled schedule. Any systemic failure of the compositing extensions
//! drops the manager into fallback mode; the window manager keeps running
//! uncomposited.

pub mod animation;
pub mod backend;
pub mod damage;
pub mod entry;
pub mod error;
pub mod rendering_context;
pub mod scheduler;
pub mod stats;
pub mod surface;
pub mod x11;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::shared::{Geometry, WindowId};
use animation::{AnimationEngine, AnimationKind};
use backend::{DisplayBackend, ExtensionInfo, RootTarget};
use damage::DamageTracker;
use entry::WindowCompositeEntry;
use error::{CompositorError, CompositorResult};
use rendering_context::DamageSink;
use scheduler::CompositeScheduler;
use stats::FrameStats;
use surface::SurfaceCache;

/// Compositing manager lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Active,
    DisabledFallback,
}

/// Tunables of the compositing manager
#[derive(Debug, Clone)]
pub struct CompositorSettings {
    /// Coalescing window of the throttled composite path
    pub throttle_interval: Duration,
    /// Damage rectangles kept per window before degrading to whole-window
    pub damage_region_budget: usize,
    pub minimize_duration: Duration,
    pub restore_duration: Duration,
    pub fade: bool,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(16),
            damage_region_budget: 16,
            minimize_duration: Duration::from_millis(200),
            restore_duration: Duration::from_millis(200),
            fade: true,
        }
    }
}

/// Outcome of one composite pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Windows whose content made it to the screen (or had nothing to show)
    pub painted: Vec<WindowId>,
    /// Windows skipped this pass; they stay damaged
    pub skipped: Vec<WindowId>,
}

pub struct CompositingManager<B: DisplayBackend> {
    state: LifecycleState,
    backend: Option<B>,
    extensions: Option<ExtensionInfo>,
    root_target: Option<RootTarget>,
    entries: HashMap<WindowId, WindowCompositeEntry>,
    /// Mapped registered windows, back-to-front
    stacking: Vec<WindowId>,
    damage: DamageTracker,
    surfaces: SurfaceCache,
    animations: AnimationEngine,
    scheduler: CompositeScheduler,
    stats: FrameStats,
    settings: CompositorSettings,
}

impl<B: DisplayBackend> CompositingManager<B> {
    pub fn new(settings: CompositorSettings) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            backend: None,
            extensions: None,
            root_target: None,
            entries: HashMap::new(),
            stacking: Vec::new(),
            damage: DamageTracker::new(settings.damage_region_budget),
            surfaces: SurfaceCache::new(),
            animations: AnimationEngine::new(),
            scheduler: CompositeScheduler::new(settings.throttle_interval),
            stats: FrameStats::new(),
            settings,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Probe the compositing extensions on `backend`. A missing extension
    /// is reported as an error and leaves the manager non-activatable.
    pub fn initialize(&mut self, mut backend: B) -> CompositorResult<ExtensionInfo> {
        if self.state == LifecycleState::Active {
            return Err(CompositorError::InvalidState {
                op: "initialize",
                state: self.state,
            });
        }

        match backend.query_extensions() {
            Ok(info) => {
                info!(
                    "Compositing available: Composite {}.{}, Damage {}.{} (event base {}), Render {}.{}",
                    info.composite_version.0,
                    info.composite_version.1,
                    info.damage_version.0,
                    info.damage_version.1,
                    info.damage_event_base,
                    info.render_version.0,
                    info.render_version.1
                );
                self.backend = Some(backend);
                self.extensions = Some(info);
                self.state = LifecycleState::Initialized;
                Ok(info)
            }
            Err(e) => {
                warn!("Compositing unavailable, running uncomposited: {}", e);
                self.backend = None;
                self.extensions = None;
                self.state = LifecycleState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Redirect windows off-screen and start compositing. On failure all
    /// partially created resources are released and the manager falls back.
    pub fn activate_compositing(&mut self) -> CompositorResult<()> {
        match self.state {
            LifecycleState::Initialized => {}
            LifecycleState::Active => {
                debug!("Compositing already active");
                return Ok(());
            }
            state => {
                return Err(CompositorError::InvalidState {
                    op: "activate_compositing",
                    state,
                });
            }
        }

        let Some(backend) = self.backend.as_mut() else {
            return Err(CompositorError::InvalidState {
                op: "activate_compositing",
                state: self.state,
            });
        };

        info!("Activating compositing");

        if let Err(e) = backend.redirect_windows() {
            error!("Failed to redirect windows: {}", e);
            self.state = LifecycleState::DisabledFallback;
            return Err(e);
        }

        let target = match backend.create_root_target() {
            Ok(target) => target,
            Err(e) => {
                error!("Failed to create root composite target: {}", e);
                backend.unredirect_windows();
                self.state = LifecycleState::DisabledFallback;
                return Err(e);
            }
        };

        let existing = match backend.stacking_order() {
            Ok(order) => order,
            Err(e) => {
                error!("Failed to read stacking order: {}", e);
                backend.destroy_root_target(target);
                backend.unredirect_windows();
                self.state = LifecycleState::DisabledFallback;
                return Err(e);
            }
        };

        self.root_target = Some(target);
        self.state = LifecycleState::Active;

        for window in existing {
            if let Err(e) = self.register_window(window) {
                if self.state != LifecycleState::Active {
                    return Err(e);
                }
                debug!("Skipping window {:#x} during activation: {}", window, e);
            }
        }

        info!(
            "Compositing active ({}x{}, {} windows)",
            target.width,
            target.height,
            self.entries.len()
        );
        self.schedule_composite();
        Ok(())
    }

    /// Release every per-window resource, un-redirect and return to
    /// Initialized. Idempotent.
    pub fn deactivate_compositing(&mut self) {
        match self.state {
            LifecycleState::Active => {
                info!("Deactivating compositing");
                self.release_all();
                self.state = LifecycleState::Initialized;
            }
            LifecycleState::DisabledFallback => {
                self.forget_all();
                self.state = if self.backend.is_some() {
                    LifecycleState::Initialized
                } else {
                    LifecycleState::Uninitialized
                };
            }
            LifecycleState::Initialized | LifecycleState::Uninitialized => {}
        }
    }

    /// Deactivate and reset to Uninitialized. Safe from any state.
    pub fn cleanup(&mut self) {
        if self.state == LifecycleState::Active {
            self.release_all();
        } else {
            self.forget_all();
        }
        self.backend = None;
        self.extensions = None;
        self.state = LifecycleState::Uninitialized;
        debug!("Compositor cleaned up");
    }

    /// Systemic failure while active: tear down and keep the window manager
    /// running uncomposited.
    fn degrade(&mut self, cause: &CompositorError) {
        if self.state != LifecycleState::Active {
            return;
        }
        error!("Compositing failed, falling back to uncomposited mode: {}", cause);
        self.release_all();
        self.state = LifecycleState::DisabledFallback;
    }

    /// Route an error: window-scoped ones are logged, anything else degrades
    fn absorb(&mut self, err: CompositorError) -> CompositorError {
        if err.is_window_scoped() {
            debug!("Window-scoped compositing failure: {}", err);
        } else {
            self.degrade(&err);
        }
        err
    }

    fn release_all(&mut self) {
        self.scheduler.cancel();
        self.animations.clear();

        if let Some(backend) = self.backend.as_mut() {
            for entry in self.entries.values_mut() {
                self.surfaces.invalidate(backend, entry);
                if let Some(damage) = entry.damage.take() {
                    backend.destroy_damage(damage);
                }
            }
            if let Some(target) = self.root_target.take() {
                backend.destroy_root_target(target);
            }
            backend.unredirect_windows();
        }

        self.forget_all();
    }

    /// Drop bookkeeping without touching the server
    fn forget_all(&mut self) {
        self.scheduler.cancel();
        self.animations.clear();
        for entry in self.entries.values_mut() {
            self.surfaces.drop_without_release(entry);
        }
        self.entries.clear();
        self.stacking.clear();
        self.damage.reset();
        self.surfaces.reset();
        self.root_target = None;
    }

    // ------------------------------------------------------------------
    // State queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The compositing extensions were found
    pub fn compositing_enabled(&self) -> bool {
        self.extensions.is_some() && self.state != LifecycleState::Uninitialized
    }

    pub fn compositing_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    /// First event code of the Damage extension, once initialized
    pub fn damage_event_base(&self) -> Option<u8> {
        self.extensions.map(|info| info.damage_event_base)
    }

    pub fn extensions(&self) -> Option<&ExtensionInfo> {
        self.extensions.as_ref()
    }

    /// Mapped registered windows, back-to-front
    pub fn stacking_order(&self) -> &[WindowId] {
        &self.stacking
    }

    pub fn window(&self, window: WindowId) -> Option<&WindowCompositeEntry> {
        self.entries.get(&window)
    }

    pub fn windows(&self) -> impl Iterator<Item = &WindowCompositeEntry> {
        self.entries.values()
    }

    pub fn window_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_damaged(&self, window: WindowId) -> bool {
        self.damage.is_damaged(window)
    }

    pub fn is_animating(&self, window: WindowId) -> bool {
        self.animations.is_running(window)
    }

    pub fn has_pending_composite(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn next_composite_deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    pub fn frame_count(&self) -> u64 {
        self.stats.passes()
    }

    pub fn fps(&self) -> f64 {
        self.stats.fps()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.live()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    // ------------------------------------------------------------------
    // Window bookkeeping
    // ------------------------------------------------------------------

    /// Start compositing a window. No-op unless active.
    pub fn register_window(&mut self, window: WindowId) -> CompositorResult<()> {
        if self.state != LifecycleState::Active || self.entries.contains_key(&window) {
            return Ok(());
        }
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };

        let attrs = match backend.window_attributes(window) {
            Ok(attrs) => attrs,
            Err(e) => return Err(self.absorb(CompositorError::for_window(window, e))),
        };
        let damage = match backend.create_damage(window) {
            Ok(handle) => handle,
            Err(e) => return Err(self.absorb(CompositorError::for_window(window, e))),
        };

        let mut entry = WindowCompositeEntry::new(window, attrs.geometry, attrs.viewable);
        entry.damage = Some(damage);
        self.entries.insert(window, entry);
        self.damage.track(window);
        if attrs.viewable {
            self.push_stacking(window);
        }

        debug!(
            "Registered window {:#x} at {:?} (mapped: {})",
            window, attrs.geometry, attrs.viewable
        );
        self.schedule_composite();
        Ok(())
    }

    pub fn unregister_window(&mut self, window: WindowId) {
        if self.state != LifecycleState::Active {
            return;
        }
        let Some(mut entry) = self.entries.remove(&window) else {
            return;
        };

        if let Some(backend) = self.backend.as_mut() {
            self.surfaces.invalidate(backend, &mut entry);
            if let Some(damage) = entry.damage.take() {
                backend.destroy_damage(damage);
            }
            backend.forget_window(window);
        }
        self.damage.forget(window);
        self.animations.cancel(window);
        self.stacking.retain(|&w| w != window);

        debug!("Unregistered window {:#x}", window);
        if entry.mapped {
            self.schedule_composite();
        }
    }

    /// Re-read a window's geometry and map state from the server
    pub fn update_window(&mut self, window: WindowId) {
        if self.state != LifecycleState::Active || !self.entries.contains_key(&window) {
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match backend.window_attributes(window) {
            Ok(attrs) => {
                self.apply_geometry(window, attrs.geometry);
                if attrs.viewable {
                    self.map_window(window);
                } else {
                    self.unmap_window(window);
                }
            }
            Err(e) => {
                self.absorb(CompositorError::for_window(window, e));
            }
        }
    }

    pub fn map_window(&mut self, window: WindowId) {
        if self.state != LifecycleState::Active {
            return;
        }
        if !self.entries.contains_key(&window) {
            // Mapped before we saw it created
            if let Err(e) = self.register_window(window) {
                debug!("Could not register mapped window {:#x}: {}", window, e);
            }
            return;
        }
        if let Some(entry) = self.entries.get_mut(&window) {
            entry.mapped = true;
        }
        self.animations.resume(window, Instant::now());
        self.push_stacking(window);
        self.damage.damage_whole(window);
        self.schedule_composite();
    }

    pub fn unmap_window(&mut self, window: WindowId) {
        if self.state != LifecycleState::Active {
            return;
        }
        let Some(entry) = self.entries.get_mut(&window) else {
            return;
        };
        let was_mapped = std::mem::replace(&mut entry.mapped, false);
        // The named pixmap stops tracking the window once it is unmapped
        if let Some(backend) = self.backend.as_mut() {
            self.surfaces.invalidate(backend, entry);
        }
        self.animations.cancel(window);
        self.stacking.retain(|&w| w != window);
        if was_mapped {
            self.schedule_composite();
        }
    }

    /// Position change only; the surface stays valid
    pub fn move_window(&mut self, window: WindowId, x: i32, y: i32) {
        if self.state != LifecycleState::Active {
            return;
        }
        let Some(current) = self.entries.get(&window).map(|e| e.server_geometry) else {
            return;
        };
        self.apply_geometry(window, Geometry { x, y, ..current });
    }

    /// Geometry change; a new size invalidates the surface in the same step
    pub fn resize_window(&mut self, window: WindowId, x: i32, y: i32, width: u32, height: u32) {
        if self.state != LifecycleState::Active {
            return;
        }
        self.apply_geometry(window, Geometry::new(x, y, width, height));
    }

    fn apply_geometry(&mut self, window: WindowId, geometry: Geometry) {
        let Some(entry) = self.entries.get_mut(&window) else {
            return;
        };
        if entry.server_geometry == geometry && entry.geometry == geometry {
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            if self.surfaces.apply_geometry(backend, entry, geometry) {
                trace!("Window {:#x} resized to {}x{}", window, geometry.width, geometry.height);
            }
        } else {
            entry.server_geometry = geometry;
            entry.geometry = geometry;
        }
        self.damage.damage_whole(window);
        if entry.mapped {
            self.schedule_composite();
        }
    }

    /// Force surface re-acquisition on the next pass
    pub fn invalidate_window_surface(&mut self, window: WindowId) {
        if self.state != LifecycleState::Active {
            return;
        }
        let Some(entry) = self.entries.get_mut(&window) else {
            return;
        };
        if let Some(backend) = self.backend.as_mut() {
            self.surfaces.invalidate(backend, entry);
        }
        self.damage.damage_whole(window);
        self.schedule_composite();
    }

    pub fn set_window_opacity(&mut self, window: WindowId, opacity: f32) {
        if self.state != LifecycleState::Active {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&window) {
            entry.opacity = opacity.clamp(0.0, 1.0);
            self.damage.damage_whole(window);
            self.schedule_composite();
        }
    }

    fn push_stacking(&mut self, window: WindowId) {
        if !self.stacking.contains(&window) {
            self.stacking.push(window);
        }
    }

    /// Raise/lower happened; resolved lazily by the next pass
    pub fn mark_stacking_order_dirty(&mut self) {
        if self.state != LifecycleState::Active {
            return;
        }
        self.damage.mark_stacking_dirty();
        self.schedule_composite();
    }

    /// Rebuild the stacking order from the server's snapshot. Unknown
    /// handles are skipped; mapped windows missing from the snapshot keep
    /// their relative order on top.
    fn resolve_stacking_order(&mut self) -> CompositorResult<()> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };
        let snapshot = backend.stacking_order()?;

        let mut resolved = Vec::with_capacity(self.stacking.len());
        for window in snapshot {
            let mapped = self.entries.get(&window).map(|e| e.mapped).unwrap_or(false);
            if mapped && !resolved.contains(&window) {
                resolved.push(window);
            }
        }
        for &window in &self.stacking {
            if !resolved.contains(&window) {
                resolved.push(window);
            }
        }

        trace!("Resolved stacking order: {:?}", resolved);
        self.stacking = resolved;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Damage / expose
    // ------------------------------------------------------------------

    /// Merge a reported (window-relative) sub-region; `None` is the whole window
    pub fn handle_damage_notify(&mut self, window: WindowId, area: Option<Geometry>) {
        if self.state != LifecycleState::Active || !self.entries.contains_key(&window) {
            return;
        }
        self.damage.add(window, area);
        self.schedule_composite();
    }

    /// The server may have invalidated the surface behind our back
    pub fn handle_expose_event(&mut self, window: WindowId) {
        if self.state != LifecycleState::Active {
            return;
        }
        if self.entries.contains_key(&window) {
            self.invalidate_window_surface(window);
        } else {
            // Root or overlay exposed: repaint everything
            self.schedule_composite();
        }
    }

    /// Asynchronous protocol error from one of the compositing extensions.
    /// Errors scoped to a registered window only invalidate that window.
    pub fn handle_extension_error(&mut self, resource: u32, window_scoped: bool) {
        if self.state != LifecycleState::Active {
            return;
        }
        let owner = self.entries.values().find_map(|entry| {
            let owns = entry.id == resource
                || entry.damage == Some(resource)
                || entry
                    .surface
                    .map(|s| s.pixmap == resource || s.picture == resource)
                    .unwrap_or(false);
            owns.then_some(entry.id)
        });

        match (window_scoped, owner) {
            (true, Some(window)) => {
                warn!("Compositing error on window {:#x}, re-acquiring its surface", window);
                self.invalidate_window_surface(window);
            }
            (true, None) => {
                debug!("Ignoring error for stale resource {:#x}", resource);
            }
            (false, _) => {
                let cause = CompositorError::Protocol(format!(
                    "unexpected error on resource {:#x}",
                    resource
                ));
                self.degrade(&cause);
            }
        }
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Request a throttled composite. Non-blocking.
    pub fn schedule_composite(&mut self) {
        if self.state == LifecycleState::Active {
            self.scheduler.request(Instant::now());
        }
    }

    /// Run the throttled composite if its deadline has passed.
    /// Returns true if a pass ran.
    pub fn run_scheduled(&mut self, now: Instant) -> bool {
        if self.state != LifecycleState::Active || !self.scheduler.take_due(now) {
            return false;
        }
        self.composite_at(now);
        true
    }

    /// Composite synchronously, cancelling any pending throttled request.
    /// For interactive paths (drag-resize, cursor blink).
    pub fn perform_repair_now(&mut self) {
        if self.state != LifecycleState::Active {
            return;
        }
        self.scheduler.cancel();
        self.composite_at(Instant::now());
    }

    // ------------------------------------------------------------------
    // Animations
    // ------------------------------------------------------------------

    pub fn animate_window_minimize(&mut self, window: WindowId, from: Geometry, to: Geometry) {
        let (duration, fade) = (self.settings.minimize_duration, self.settings.fade);
        self.start_animation(window, AnimationKind::Minimize, from, to, duration, fade);
    }

    pub fn animate_window_restore(&mut self, window: WindowId, from: Geometry, to: Geometry) {
        let (duration, fade) = (self.settings.restore_duration, self.settings.fade);
        self.start_animation(window, AnimationKind::Restore, from, to, duration, fade);
    }

    pub fn animate_window_transition(
        &mut self,
        window: WindowId,
        from: Geometry,
        to: Geometry,
        duration: Duration,
        fade: bool,
    ) {
        self.start_animation(window, AnimationKind::Transition, from, to, duration, fade);
    }

    fn start_animation(
        &mut self,
        window: WindowId,
        kind: AnimationKind,
        from: Geometry,
        to: Geometry,
        duration: Duration,
        fade: bool,
    ) {
        if self.state != LifecycleState::Active {
            return;
        }
        let Some(mapped) = self.entries.get(&window).map(|e| e.mapped) else {
            return;
        };
        if mapped {
            self.animations
                .start(window, kind, from, to, duration, fade, Instant::now());
            self.schedule_composite();
        } else {
            // Nothing to draw yet; the clock starts when the window is mapped
            self.animations
                .defer(window, kind, from, to, duration, fade, Instant::now());
        }
    }

    // ------------------------------------------------------------------
    // Composite pass
    // ------------------------------------------------------------------

    pub fn composite_screen(&mut self) -> Option<PassReport> {
        self.composite_at(Instant::now())
    }

    /// Composite the screen as of `now`. Returns `None` when nothing was
    /// drawn (not active, or the pass failed and the manager fell back).
    pub fn composite_at(&mut self, now: Instant) -> Option<PassReport> {
        if self.state != LifecycleState::Active {
            return None;
        }

        match self.paint_pass(now) {
            Ok(report) => {
                if !report.skipped.is_empty() {
                    debug!("Composite skipped windows {:x?}", report.skipped);
                }
                if let Some(summary) = self.stats.record(now, report.skipped.len()) {
                    debug!(
                        "Compositor: {:.1} fps, {} windows skipped",
                        summary.fps, summary.skipped
                    );
                }
                if self.animations.has_running() {
                    self.scheduler.request(now);
                }
                Some(report)
            }
            Err(e) => {
                self.degrade(&e);
                None
            }
        }
    }

    fn paint_pass(&mut self, now: Instant) -> CompositorResult<PassReport> {
        if self.damage.take_stacking_dirty() {
            self.resolve_stacking_order()?;
        }
        let entries = &self.entries;
        self.animations
            .retain(|window| entries.get(&window).map(|e| e.mapped).unwrap_or(false));

        let state = self.state;
        let target = self.root_target.ok_or(CompositorError::InvalidState {
            op: "composite_screen",
            state,
        })?;
        let backend = self.backend.as_mut().ok_or(CompositorError::InvalidState {
            op: "composite_screen",
            state,
        })?;

        backend.begin_frame(&target)?;

        let mut report = PassReport::default();
        for &window in &self.stacking {
            let Some(entry) = self.entries.get_mut(&window) else {
                continue;
            };
            if !entry.mapped {
                continue;
            }

            let (dest, opacity) = match self.animations.advance(window, now) {
                Some(frame) if frame.finished => {
                    // Snap where it is drawn; the surface keeps the server size
                    entry.geometry = frame.rect;
                    (entry.geometry, entry.opacity * frame.opacity)
                }
                Some(frame) => (frame.rect, entry.opacity * frame.opacity),
                None => (entry.geometry, entry.opacity),
            };
            if dest.is_empty() || opacity <= 0.0 {
                report.painted.push(window);
                continue;
            }

            if let Err(e) = self.surfaces.acquire(backend, entry) {
                if !e.is_window_scoped() {
                    return Err(e);
                }
                warn!("Skipping window {:#x} this pass: {}", window, e);
                self.damage.damage_whole(window);
                report.skipped.push(window);
                continue;
            }
            let Some(surface) = entry.surface else {
                continue;
            };

            if let Err(e) = backend.paint(&target, &surface, &dest, opacity) {
                if !e.is_window_scoped() {
                    return Err(e);
                }
                warn!("Failed to paint window {:#x}: {}", window, e);
                self.surfaces.invalidate(backend, entry);
                self.damage.damage_whole(window);
                report.skipped.push(window);
                continue;
            }
            report.painted.push(window);
        }

        backend.present(&target)?;

        for &window in &report.painted {
            self.damage.clear(window);
            let handle = self.entries.get(&window).and_then(|e| e.damage);
            if let Some(handle) = handle {
                if let Err(e) = backend.subtract_damage(handle) {
                    if !e.is_window_scoped() {
                        return Err(e);
                    }
                }
            }
        }

        trace!(
            "Composited {} windows ({} skipped)",
            report.painted.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

impl<B: DisplayBackend> DamageSink for CompositingManager<B> {
    fn notify_rendering_complete(&mut self, window: WindowId, region: Option<Geometry>) {
        self.handle_damage_notify(window, region);
    }
}

impl<B: DisplayBackend> Drop for CompositingManager<B> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Active {
            self.cleanup();
        }
    }
}

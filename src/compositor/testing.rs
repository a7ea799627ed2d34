//! Recording display backend with injectable failures

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::compositor::backend::{
    DamageHandle, DisplayBackend, ExtensionInfo, RootTarget, StackingSource, Surface,
    WindowAttributes,
};
use crate::compositor::error::{CompositorError, CompositorResult};
use crate::shared::{Geometry, WindowId};

pub const DAMAGE_EVENT_BASE: u8 = 91;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintCall {
    pub window: WindowId,
    pub dest: Geometry,
    pub opacity: f32,
}

#[derive(Debug)]
pub struct MockState {
    pub extensions_available: bool,
    pub fail_redirect: bool,
    pub fail_root_target: bool,
    pub fail_paint_systemic: bool,
    /// Windows whose surface acquisition fails with a window-scoped error
    pub fail_acquire: HashSet<WindowId>,
    /// Server-side windows
    pub windows: HashMap<WindowId, WindowAttributes>,
    /// Server-side stacking, back-to-front
    pub stacking: Vec<WindowId>,

    pub calls: Vec<&'static str>,
    pub redirected: bool,
    pub root_target: Option<RootTarget>,
    pub live_surfaces: HashMap<u32, WindowId>,
    pub live_damage: HashSet<DamageHandle>,
    pub subtracted: Vec<DamageHandle>,
    pub acquired: Vec<WindowId>,
    pub forgotten: Vec<WindowId>,
    pub frame: Vec<PaintCall>,
    pub frames: Vec<Vec<PaintCall>>,
    next_id: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            extensions_available: true,
            fail_redirect: false,
            fail_root_target: false,
            fail_paint_systemic: false,
            fail_acquire: HashSet::new(),
            windows: HashMap::new(),
            stacking: Vec::new(),
            calls: Vec::new(),
            redirected: false,
            root_target: None,
            live_surfaces: HashMap::new(),
            live_damage: HashSet::new(),
            subtracted: Vec::new(),
            acquired: Vec::new(),
            forgotten: Vec::new(),
            frame: Vec::new(),
            frames: Vec::new(),
            next_id: 0x100,
        }
    }
}

impl MockState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_window(&mut self, window: WindowId, geometry: Geometry, viewable: bool) {
        self.windows.insert(window, WindowAttributes { geometry, viewable });
        if !self.stacking.contains(&window) {
            self.stacking.push(window);
        }
    }

    pub fn last_frame(&self) -> &[PaintCall] {
        self.frames.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn painted_in_last_frame(&self) -> Vec<WindowId> {
        self.last_frame().iter().map(|p| p.window).collect()
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.state.borrow_mut().extensions_available = false;
        backend
    }
}

impl StackingSource for MockBackend {
    fn stacking_order(&self) -> CompositorResult<Vec<WindowId>> {
        Ok(self.state.borrow().stacking.clone())
    }
}

impl DisplayBackend for MockBackend {
    fn query_extensions(&mut self) -> CompositorResult<ExtensionInfo> {
        let mut state = self.state.borrow_mut();
        state.calls.push("query_extensions");
        if !state.extensions_available {
            return Err(CompositorError::ExtensionUnavailable("Composite"));
        }
        Ok(ExtensionInfo {
            composite_version: (0, 4),
            damage_version: (1, 1),
            render_version: (0, 11),
            damage_event_base: DAMAGE_EVENT_BASE,
            damage_error_base: 150,
        })
    }

    fn redirect_windows(&mut self) -> CompositorResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push("redirect_windows");
        if state.fail_redirect {
            return Err(CompositorError::Protocol("BadAccess in RedirectSubwindows".into()));
        }
        state.redirected = true;
        Ok(())
    }

    fn unredirect_windows(&mut self) {
        let mut state = self.state.borrow_mut();
        state.calls.push("unredirect_windows");
        state.redirected = false;
    }

    fn create_root_target(&mut self) -> CompositorResult<RootTarget> {
        let mut state = self.state.borrow_mut();
        state.calls.push("create_root_target");
        if state.fail_root_target {
            return Err(CompositorError::ResourcesExhausted);
        }
        let target = RootTarget {
            overlay: state.next_id(),
            overlay_picture: state.next_id(),
            buffer: state.next_id(),
            buffer_picture: state.next_id(),
            width: 1920,
            height: 1080,
        };
        state.root_target = Some(target);
        Ok(target)
    }

    fn destroy_root_target(&mut self, _target: RootTarget) {
        let mut state = self.state.borrow_mut();
        state.calls.push("destroy_root_target");
        state.root_target = None;
    }

    fn window_attributes(&mut self, window: WindowId) -> CompositorResult<WindowAttributes> {
        let state = self.state.borrow();
        state.windows.get(&window).copied().ok_or(CompositorError::Window {
            window,
            reason: "BadWindow".into(),
        })
    }

    fn create_damage(&mut self, window: WindowId) -> CompositorResult<DamageHandle> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&window) {
            return Err(CompositorError::Window {
                window,
                reason: "BadDrawable".into(),
            });
        }
        let handle = state.next_id();
        state.live_damage.insert(handle);
        Ok(handle)
    }

    fn destroy_damage(&mut self, damage: DamageHandle) {
        self.state.borrow_mut().live_damage.remove(&damage);
    }

    fn subtract_damage(&mut self, damage: DamageHandle) -> CompositorResult<()> {
        self.state.borrow_mut().subtracted.push(damage);
        Ok(())
    }

    fn acquire_surface(&mut self, window: WindowId, _geometry: &Geometry) -> CompositorResult<Surface> {
        let mut state = self.state.borrow_mut();
        state.acquired.push(window);
        if state.fail_acquire.contains(&window) {
            return Err(CompositorError::Window {
                window,
                reason: "BadMatch in NameWindowPixmap".into(),
            });
        }
        // The server hands back a pixmap of the window's real size
        let size = state
            .windows
            .get(&window)
            .map(|attrs| (attrs.geometry.width, attrs.geometry.height))
            .ok_or(CompositorError::Window {
                window,
                reason: "BadWindow".into(),
            })?;
        let surface = Surface {
            pixmap: state.next_id(),
            picture: state.next_id(),
            width: size.0,
            height: size.1,
        };
        state.live_surfaces.insert(surface.picture, window);
        Ok(surface)
    }

    fn release_surface(&mut self, surface: Surface) {
        self.state.borrow_mut().live_surfaces.remove(&surface.picture);
    }

    fn forget_window(&mut self, window: WindowId) {
        self.state.borrow_mut().forgotten.push(window);
    }

    fn begin_frame(&mut self, _target: &RootTarget) -> CompositorResult<()> {
        self.state.borrow_mut().frame.clear();
        Ok(())
    }

    fn paint(
        &mut self,
        _target: &RootTarget,
        surface: &Surface,
        dest: &Geometry,
        opacity: f32,
    ) -> CompositorResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_paint_systemic {
            return Err(CompositorError::Protocol("BadAlloc in Composite".into()));
        }
        let window = state
            .live_surfaces
            .get(&surface.picture)
            .copied()
            .ok_or_else(|| CompositorError::Protocol("BadPicture: released surface painted".into()))?;
        state.frame.push(PaintCall {
            window,
            dest: *dest,
            opacity,
        });
        Ok(())
    }

    fn present(&mut self, _target: &RootTarget) -> CompositorResult<()> {
        let mut state = self.state.borrow_mut();
        let frame = std::mem::take(&mut state.frame);
        state.frames.push(frame);
        Ok(())
    }
}

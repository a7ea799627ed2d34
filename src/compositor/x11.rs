//! XRender backend over an x11rb connection

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::{self, ConnectionExt as CompositeExt, Redirect};
use x11rb::protocol::damage::{self, ConnectionExt as DamageExt, ReportLevel};
use x11rb::protocol::render::{
    self, Color, ConnectionExt as RenderExt, CreatePictureAux, Fixed, PictOp, Pictformat,
    QueryPictFormatsReply, Transform,
};
use x11rb::protocol::shape::{ConnectionExt as ShapeExt, SK, SO};
use x11rb::protocol::xproto::{
    ClipOrdering, ConnectionExt as _, MapState, Rectangle, SubwindowMode, Visualid, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::NONE;

use crate::compositor::backend::{
    DamageHandle, DisplayBackend, ExtensionInfo, RootTarget, StackingSource, Surface,
    WindowAttributes,
};
use crate::compositor::error::{CompositorError, CompositorResult};
use crate::shared::{Geometry, WindowId};

const COMPOSITE_MIN: (u32, u32) = (0, 3);
const DAMAGE_MIN: (u32, u32) = (1, 1);
const RENDER_MIN: (u32, u32) = (0, 10);

fn fixed(value: f64) -> Fixed {
    (value * 65536.0).round() as Fixed
}

fn identity() -> Transform {
    Transform {
        matrix11: fixed(1.0),
        matrix12: 0,
        matrix13: 0,
        matrix21: 0,
        matrix22: fixed(1.0),
        matrix23: 0,
        matrix31: 0,
        matrix32: 0,
        matrix33: fixed(1.0),
    }
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn clamp_u16(v: u32) -> u16 {
    v.min(u16::MAX as u32) as u16
}

/// 0xRRGGBB to an opaque Render color
fn color_from_rgb(rgb: u32) -> Color {
    let channel = |shift: u32| ((rgb >> shift) & 0xff) as u16 * 257;
    Color {
        red: channel(16),
        green: channel(8),
        blue: channel(0),
        alpha: 0xffff,
    }
}

fn require_version(
    name: &'static str,
    have: (u32, u32),
    need: (u32, u32),
) -> CompositorResult<()> {
    if have < need {
        return Err(CompositorError::ExtensionTooOld {
            name,
            major: have.0,
            minor: have.1,
        });
    }
    Ok(())
}

pub struct X11Backend {
    conn: Arc<RustConnection>,
    screen_num: usize,
    root: u32,
    width: u16,
    height: u16,
    root_depth: u8,
    root_visual: Visualid,
    background: u32,
    formats: Option<QueryPictFormatsReply>,
    visuals: HashMap<WindowId, Visualid>,
    overlay: Option<u32>,
}

impl X11Backend {
    pub fn new(conn: Arc<RustConnection>, screen_num: usize, background: u32) -> CompositorResult<Self> {
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| CompositorError::Protocol(format!("screen {} does not exist", screen_num)))?;

        let (root, width, height) = (screen.root, screen.width_in_pixels, screen.height_in_pixels);
        let (root_depth, root_visual) = (screen.root_depth, screen.root_visual);

        Ok(Self {
            conn,
            screen_num,
            root,
            width,
            height,
            root_depth,
            root_visual,
            background,
            formats: None,
            visuals: HashMap::new(),
            overlay: None,
        })
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn overlay_window(&self) -> Option<u32> {
        self.overlay
    }

    fn format_for_visual(&self, visual: Visualid) -> Option<Pictformat> {
        let formats = self.formats.as_ref()?;
        let preferred = formats.screens.get(self.screen_num).into_iter();
        preferred
            .chain(formats.screens.iter())
            .flat_map(|screen| screen.depths.iter())
            .flat_map(|depth| depth.visuals.iter())
            .find(|v| v.visual == visual)
            .map(|v| v.format)
    }

    fn visual_of(&mut self, window: WindowId) -> CompositorResult<Visualid> {
        if let Some(visual) = self.visuals.get(&window) {
            return Ok(*visual);
        }
        let attrs = self
            .conn
            .get_window_attributes(window)?
            .reply()
            .map_err(|e| CompositorError::for_window(window, e))?;
        self.visuals.insert(window, attrs.visual);
        Ok(attrs.visual)
    }

    /// Bind a picture to a freshly named window pixmap
    fn bind_surface(&mut self, window: WindowId, pixmap: u32) -> CompositorResult<Surface> {
        let pixmap_geom = self
            .conn
            .get_geometry(pixmap)?
            .reply()
            .map_err(|e| CompositorError::for_window(window, e))?;

        let visual = self.visual_of(window)?;
        let format = self.format_for_visual(visual).ok_or_else(|| CompositorError::Window {
            window,
            reason: format!("no picture format for visual {:#x}", visual),
        })?;

        let picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(
                picture,
                pixmap,
                format,
                &CreatePictureAux::new().subwindowmode(SubwindowMode::INCLUDE_INFERIORS),
            )?
            .check()
            .map_err(|e| CompositorError::for_window(window, e))?;

        Ok(Surface {
            pixmap,
            picture,
            width: pixmap_geom.width as u32,
            height: pixmap_geom.height as u32,
        })
    }

    fn build_root_target(&mut self, target: &mut RootTarget) -> CompositorResult<()> {
        // Input passes through the overlay to the windows below
        if let Err(e) = self.conn.shape_rectangles(
            SO::SET,
            SK::INPUT,
            ClipOrdering::UNSORTED,
            target.overlay,
            0,
            0,
            &[],
        ) {
            warn!("Failed to make overlay input-transparent: {}", e);
        }

        let format = self.format_for_visual(self.root_visual).ok_or_else(|| {
            CompositorError::Protocol(format!("no picture format for root visual {:#x}", self.root_visual))
        })?;

        target.overlay_picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(target.overlay_picture, target.overlay, format, &CreatePictureAux::new())?
            .check()?;

        target.buffer = self.conn.generate_id()?;
        self.conn
            .create_pixmap(self.root_depth, target.buffer, self.root, self.width, self.height)?
            .check()?;

        target.buffer_picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(target.buffer_picture, target.buffer, format, &CreatePictureAux::new())?
            .check()?;

        Ok(())
    }
}

impl StackingSource for X11Backend {
    fn stacking_order(&self) -> CompositorResult<Vec<WindowId>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        Ok(tree
            .children
            .into_iter()
            .filter(|&w| Some(w) != self.overlay)
            .collect())
    }
}

impl DisplayBackend for X11Backend {
    fn query_extensions(&mut self) -> CompositorResult<ExtensionInfo> {
        self.conn
            .extension_information(composite::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("Composite"))?;
        let composite_version = self.conn.composite_query_version(0, 4)?.reply()?;
        let composite_version = (composite_version.major_version, composite_version.minor_version);
        require_version("Composite", composite_version, COMPOSITE_MIN)?;

        let damage_info = self
            .conn
            .extension_information(damage::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("Damage"))?;
        // Must be negotiated before any other Damage request
        let damage_version = self.conn.damage_query_version(1, 1)?.reply()?;
        let damage_version = (damage_version.major_version, damage_version.minor_version);
        require_version("Damage", damage_version, DAMAGE_MIN)?;

        self.conn
            .extension_information(render::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("Render"))?;
        let render_version = self.conn.render_query_version(0, 11)?.reply()?;
        let render_version = (render_version.major_version, render_version.minor_version);
        require_version("Render", render_version, RENDER_MIN)?;

        self.formats = Some(self.conn.render_query_pict_formats()?.reply()?);

        Ok(ExtensionInfo {
            composite_version,
            damage_version,
            render_version,
            damage_event_base: damage_info.first_event,
            damage_error_base: damage_info.first_error,
        })
    }

    fn redirect_windows(&mut self) -> CompositorResult<()> {
        // Fails with BadAccess when another compositor already redirected
        self.conn
            .composite_redirect_subwindows(self.root, Redirect::MANUAL)?
            .check()?;
        info!("Redirected subwindows of root {:#x} (manual)", self.root);
        Ok(())
    }

    fn unredirect_windows(&mut self) {
        let _ = self
            .conn
            .composite_unredirect_subwindows(self.root, Redirect::MANUAL);
        let _ = self.conn.flush();
        self.visuals.clear();
        debug!("Unredirected subwindows of root {:#x}", self.root);
    }

    fn create_root_target(&mut self) -> CompositorResult<RootTarget> {
        let overlay = self.conn.composite_get_overlay_window(self.root)?.reply()?.overlay_win;
        if overlay == NONE {
            return Err(CompositorError::ExtensionUnavailable("Composite overlay window"));
        }
        self.overlay = Some(overlay);
        info!("Using composite overlay window {:#x}", overlay);

        let mut target = RootTarget {
            overlay,
            overlay_picture: NONE,
            buffer: NONE,
            buffer_picture: NONE,
            width: self.width as u32,
            height: self.height as u32,
        };
        match self.build_root_target(&mut target) {
            Ok(()) => Ok(target),
            Err(e) => {
                self.destroy_root_target(target);
                Err(e)
            }
        }
    }

    fn destroy_root_target(&mut self, target: RootTarget) {
        if target.buffer_picture != NONE {
            let _ = self.conn.render_free_picture(target.buffer_picture);
        }
        if target.buffer != NONE {
            let _ = self.conn.free_pixmap(target.buffer);
        }
        if target.overlay_picture != NONE {
            let _ = self.conn.render_free_picture(target.overlay_picture);
        }
        let _ = self.conn.composite_release_overlay_window(self.root);
        let _ = self.conn.flush();
        self.overlay = None;
    }

    fn window_attributes(&mut self, window: WindowId) -> CompositorResult<WindowAttributes> {
        let attrs = self
            .conn
            .get_window_attributes(window)?
            .reply()
            .map_err(|e| CompositorError::for_window(window, e))?;
        if attrs.class == WindowClass::INPUT_ONLY {
            return Err(CompositorError::Window {
                window,
                reason: "input-only window has no contents".into(),
            });
        }
        self.visuals.insert(window, attrs.visual);

        let geom = self
            .conn
            .get_geometry(window)?
            .reply()
            .map_err(|e| CompositorError::for_window(window, e))?;

        Ok(WindowAttributes {
            geometry: Geometry::from_x11(geom.x, geom.y, geom.width, geom.height, geom.border_width),
            viewable: attrs.map_state == MapState::VIEWABLE,
        })
    }

    fn create_damage(&mut self, window: WindowId) -> CompositorResult<DamageHandle> {
        let damage = self.conn.generate_id()?;
        self.conn
            .damage_create(damage, window, ReportLevel::NON_EMPTY)?
            .check()
            .map_err(|e| CompositorError::for_window(window, e))?;
        debug!("Created damage object {:#x} for window {:#x}", damage, window);
        Ok(damage)
    }

    fn destroy_damage(&mut self, damage: DamageHandle) {
        let _ = self.conn.damage_destroy(damage);
    }

    fn subtract_damage(&mut self, damage: DamageHandle) -> CompositorResult<()> {
        self.conn.damage_subtract(damage, NONE, NONE)?;
        Ok(())
    }

    fn acquire_surface(&mut self, window: WindowId, geometry: &Geometry) -> CompositorResult<Surface> {
        let pixmap = self.conn.generate_id()?;
        self.conn
            .composite_name_window_pixmap(window, pixmap)?
            .check()
            .map_err(|e| CompositorError::for_window(window, e))?;

        match self.bind_surface(window, pixmap) {
            Ok(surface) => {
                debug!(
                    "Bound pixmap {:#x} for window {:#x} ({}x{}, expected {}x{})",
                    pixmap, window, surface.width, surface.height, geometry.width, geometry.height
                );
                Ok(surface)
            }
            Err(e) => {
                let _ = self.conn.free_pixmap(pixmap);
                Err(e)
            }
        }
    }

    fn release_surface(&mut self, surface: Surface) {
        let _ = self.conn.render_free_picture(surface.picture);
        let _ = self.conn.free_pixmap(surface.pixmap);
    }

    fn forget_window(&mut self, window: WindowId) {
        self.visuals.remove(&window);
    }

    fn begin_frame(&mut self, target: &RootTarget) -> CompositorResult<()> {
        self.conn.render_fill_rectangles(
            PictOp::SRC,
            target.buffer_picture,
            color_from_rgb(self.background),
            &[Rectangle {
                x: 0,
                y: 0,
                width: clamp_u16(target.width),
                height: clamp_u16(target.height),
            }],
        )?;
        Ok(())
    }

    fn paint(
        &mut self,
        target: &RootTarget,
        surface: &Surface,
        dest: &Geometry,
        opacity: f32,
    ) -> CompositorResult<()> {
        let scaled = dest.width != surface.width || dest.height != surface.height;
        if scaled {
            // Transform maps destination pixels to source pixels
            let transform = Transform {
                matrix11: fixed(surface.width as f64 / dest.width as f64),
                matrix22: fixed(surface.height as f64 / dest.height as f64),
                ..identity()
            };
            self.conn.render_set_picture_transform(surface.picture, transform)?;
            self.conn.render_set_picture_filter(surface.picture, b"bilinear", &[])?;
        }

        let mask = if opacity < 1.0 {
            let mask = self.conn.generate_id()?;
            self.conn.render_create_solid_fill(
                mask,
                Color {
                    red: 0,
                    green: 0,
                    blue: 0,
                    alpha: (opacity.clamp(0.0, 1.0) * 65535.0) as u16,
                },
            )?;
            mask
        } else {
            NONE
        };

        self.conn.render_composite(
            PictOp::OVER,
            surface.picture,
            mask,
            target.buffer_picture,
            0,
            0,
            0,
            0,
            clamp_i16(dest.x),
            clamp_i16(dest.y),
            clamp_u16(dest.width),
            clamp_u16(dest.height),
        )?;

        if mask != NONE {
            self.conn.render_free_picture(mask)?;
        }
        if scaled {
            self.conn.render_set_picture_transform(surface.picture, identity())?;
            self.conn.render_set_picture_filter(surface.picture, b"nearest", &[])?;
        }
        Ok(())
    }

    fn present(&mut self, target: &RootTarget) -> CompositorResult<()> {
        self.conn.render_composite(
            PictOp::SRC,
            target.buffer_picture,
            NONE,
            target.overlay_picture,
            0,
            0,
            0,
            0,
            0,
            0,
            clamp_u16(target.width),
            clamp_u16(target.height),
        )?;
        self.conn.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point() {
        assert_eq!(fixed(1.0), 0x10000);
        assert_eq!(fixed(0.5), 0x8000);
        assert_eq!(identity().matrix33, 0x10000);
    }

    #[test]
    fn test_color_expansion() {
        let c = color_from_rgb(0xff8000);
        assert_eq!(c.red, 0xffff);
        assert_eq!(c.green, 0x8080);
        assert_eq!(c.blue, 0);
        assert_eq!(c.alpha, 0xffff);
    }

    #[test]
    fn test_version_gate() {
        assert!(require_version("Composite", (0, 4), COMPOSITE_MIN).is_ok());
        assert!(matches!(
            require_version("Composite", (0, 2), COMPOSITE_MIN),
            Err(CompositorError::ExtensionTooOld { name: "Composite", .. })
        ));
    }
}

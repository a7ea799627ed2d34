//! Titlebar decorations
//!
//! The window manager picks one `DecorationRenderer` at startup. Every draw
//! goes through `draw_titlebar`, which wraps the renderer in a
//! `RenderingContext` so the compositor hears about the repaint even when
//! the renderer bails out halfway.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ChangeGCAux, ConnectionExt as _, CreateGCAux, Gcontext, Rectangle};
use x11rb::rust_connection::RustConnection;

use crate::compositor::rendering_context::{DamageSink, RenderingContext};
use crate::config::DecorationConfig;
use crate::shared::{Geometry, WindowId};

/// What to paint and where
#[derive(Debug, Clone)]
pub struct TitlebarTarget {
    /// Drawable receiving the pixels
    pub drawable: u32,
    /// Composited top-level the titlebar belongs to
    pub window: WindowId,
    /// Titlebar rectangle, relative to `window`
    pub rect: Geometry,
    pub focused: bool,
}

pub trait DecorationRenderer {
    fn name(&self) -> &'static str;

    /// Paint the titlebar, reporting each painted rectangle to `ctx`
    fn render_titlebar(&self, target: &TitlebarTarget, ctx: &mut RenderingContext<'_>) -> Result<()>;
}

/// Draw a titlebar and notify the compositor, whatever the renderer returns
pub fn draw_titlebar(
    renderer: &dyn DecorationRenderer,
    sink: &mut dyn DamageSink,
    target: &TitlebarTarget,
) -> Result<()> {
    let mut ctx = RenderingContext::new(sink, target.window);
    let result = renderer.render_titlebar(target, &mut ctx);
    ctx.end();
    result.with_context(|| {
        format!(
            "{} renderer failed on window {:#x}",
            renderer.name(),
            target.window
        )
    })
}

/// Solid-color titlebars drawn with core X11 requests
pub struct FlatDecorationRenderer {
    conn: Arc<RustConnection>,
    gc: Gcontext,
    color: u32,
    focused_color: u32,
}

impl FlatDecorationRenderer {
    pub fn new(conn: Arc<RustConnection>, root: WindowId, config: &DecorationConfig) -> Result<Self> {
        let gc = conn.generate_id().context("Failed to allocate GC id")?;
        conn.create_gc(gc, root, &CreateGCAux::new().foreground(config.titlebar_color))
            .context("Failed to create titlebar GC")?;
        Ok(Self {
            conn,
            gc,
            color: config.titlebar_color,
            focused_color: config.titlebar_focused_color,
        })
    }
}

impl DecorationRenderer for FlatDecorationRenderer {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn render_titlebar(&self, target: &TitlebarTarget, ctx: &mut RenderingContext<'_>) -> Result<()> {
        let color = if target.focused { self.focused_color } else { self.color };
        self.conn
            .change_gc(self.gc, &ChangeGCAux::new().foreground(color))?;
        let rect = Rectangle {
            x: target.rect.x.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            y: target.rect.y.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            width: target.rect.width.min(u16::MAX as u32) as u16,
            height: target.rect.height.min(u16::MAX as u32) as u16,
        };
        self.conn
            .poly_fill_rectangle(target.drawable, self.gc, &[rect])?;
        ctx.add_damage_rect(target.rect);
        Ok(())
    }
}

impl Drop for FlatDecorationRenderer {
    fn drop(&mut self) {
        let _ = self.conn.free_gc(self.gc);
    }
}

/// Renderers selectable from `[decorations] renderer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Flat,
}

impl RendererKind {
    /// Unknown names fall back to `Flat`
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("flat") {
            return RendererKind::Flat;
        }
        warn!("Unknown decoration renderer {:?}, using \"flat\"", name);
        RendererKind::Flat
    }
}

/// Build the configured renderer
pub fn create_renderer(
    conn: Arc<RustConnection>,
    root: WindowId,
    config: &DecorationConfig,
) -> Result<Box<dyn DecorationRenderer>> {
    match RendererKind::from_name(&config.renderer) {
        RendererKind::Flat => Ok(Box::new(FlatDecorationRenderer::new(conn, root, config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[derive(Default)]
    struct Recorder {
        notified: Vec<(WindowId, Option<Geometry>)>,
    }

    impl DamageSink for Recorder {
        fn notify_rendering_complete(&mut self, window: WindowId, region: Option<Geometry>) {
            self.notified.push((window, region));
        }
    }

    struct Striped;

    impl DecorationRenderer for Striped {
        fn name(&self) -> &'static str {
            "striped"
        }

        fn render_titlebar(&self, target: &TitlebarTarget, ctx: &mut RenderingContext<'_>) -> Result<()> {
            let half = target.rect.width / 2;
            ctx.add_damage_rect(Geometry::new(target.rect.x, target.rect.y, half, target.rect.height));
            ctx.add_damage_rect(Geometry::new(
                target.rect.x + half as i32,
                target.rect.y,
                half,
                target.rect.height,
            ));
            Ok(())
        }
    }

    struct Broken;

    impl DecorationRenderer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn render_titlebar(&self, _target: &TitlebarTarget, _ctx: &mut RenderingContext<'_>) -> Result<()> {
            bail!("font missing")
        }
    }

    fn target() -> TitlebarTarget {
        TitlebarTarget {
            drawable: 0x600001,
            window: 0x400001,
            rect: Geometry::new(0, 0, 200, 24),
            focused: true,
        }
    }

    #[test]
    fn test_each_painted_region_notified_once() {
        let mut sink = Recorder::default();
        draw_titlebar(&Striped, &mut sink, &target()).unwrap();
        assert_eq!(
            sink.notified,
            vec![
                (0x400001, Some(Geometry::new(0, 0, 100, 24))),
                (0x400001, Some(Geometry::new(100, 0, 100, 24))),
            ]
        );
    }

    #[test]
    fn test_titlebar_damage_reaches_compositor() {
        use crate::compositor::testing::MockBackend;
        use crate::compositor::{CompositingManager, CompositorSettings};

        let backend = MockBackend::new();
        backend
            .state
            .borrow_mut()
            .add_window(0x400001, Geometry::new(0, 0, 200, 100), true);
        let mut manager = CompositingManager::new(CompositorSettings::default());
        manager.initialize(backend).unwrap();
        manager.activate_compositing().unwrap();
        manager.perform_repair_now();
        assert!(!manager.is_damaged(0x400001));

        draw_titlebar(&Striped, &mut manager, &target()).unwrap();
        assert!(manager.is_damaged(0x400001));
        assert!(manager.has_pending_composite());
    }

    #[test]
    fn test_renderer_name_resolution() {
        assert_eq!(RendererKind::from_name("flat"), RendererKind::Flat);
        assert_eq!(RendererKind::from_name("Flat"), RendererKind::Flat);
        assert_eq!(RendererKind::from_name("gradient"), RendererKind::Flat);
        assert_eq!(
            RendererKind::from_name(&DecorationConfig::default().renderer),
            RendererKind::Flat
        );
    }

    #[test]
    fn test_failing_renderer_still_notifies() {
        let mut sink = Recorder::default();
        let err = draw_titlebar(&Broken, &mut sink, &target()).unwrap_err();
        assert!(format!("{:#}", err).contains("font missing"));
        assert_eq!(sink.notified, vec![(0x400001, None)]);
    }
}

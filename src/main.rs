//! Area Compositor
//!
//! Standalone XRender compositing manager. Watches top-level windows on the
//! default screen and composites them onto the overlay window; without the
//! compositing extensions it keeps running and leaves the screen alone.

mod x11_async;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ChangeWindowAttributesAux, ConnectionExt, EventMask};
use x11rb::rust_connection::RustConnection;

use area_compositor::compositor::x11::X11Backend;
use area_compositor::compositor::{CompositingManager, CompositorSettings};
use area_compositor::config::Config;
use area_compositor::decorations::{create_renderer, DecorationRenderer};
use area_compositor::events::{dispatch_event, ExtensionEventTable};
use area_compositor::shared::WindowId;

/// Main application state
struct CompositorApp {
    conn: Arc<RustConnection>,
    events: x11_async::X11EventSource,
    root: WindowId,
    manager: CompositingManager<X11Backend>,
    table: ExtensionEventTable,
    /// Titlebar painter; damage it reports goes to `manager`
    decorations: Box<dyn DecorationRenderer>,
}

impl CompositorApp {
    fn new(config: &Config, compositing: bool) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
        let conn = Arc::new(conn);
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .context("X11 screen not found")?
            .root;

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::SUBSTRUCTURE_NOTIFY | EventMask::EXPOSURE),
        )?
        .check()
        .context("Failed to select root window events")?;

        let events = x11_async::X11EventSource::new(conn.clone())?;
        let decorations = create_renderer(conn.clone(), root, &config.decorations)
            .context("Failed to create decoration renderer")?;
        let mut manager = CompositingManager::new(CompositorSettings::from(config));
        let mut table = ExtensionEventTable::default();

        if compositing {
            match Self::start_compositing(&conn, screen_num, config, &mut manager) {
                Ok(t) => table = t,
                Err(e) => warn!("Compositing unavailable, running uncomposited: {:#}", e),
            }
        } else {
            info!("Compositing disabled");
        }

        Ok(Self {
            conn,
            events,
            root,
            manager,
            table,
            decorations,
        })
    }

    fn start_compositing(
        conn: &Arc<RustConnection>,
        screen_num: usize,
        config: &Config,
        manager: &mut CompositingManager<X11Backend>,
    ) -> Result<ExtensionEventTable> {
        let backend = X11Backend::new(conn.clone(), screen_num, config.compositor.background_color)?;
        let info = manager.initialize(backend)?;
        info!(
            "Composite {}.{}, Damage {}.{}, Render {}.{}",
            info.composite_version.0,
            info.composite_version.1,
            info.damage_version.0,
            info.damage_version.1,
            info.render_version.0,
            info.render_version.1
        );
        manager.activate_compositing()?;
        Ok(ExtensionEventTable::new(info.damage_event_base))
    }

    fn pump_events(&mut self) -> Result<()> {
        for event in self.events.drain()? {
            dispatch_event(&mut self.manager, &self.table, self.root, &event);
        }
        Ok(())
    }

    async fn run(&mut self, shutdown: &mut tokio::sync::mpsc::Receiver<()>) -> Result<()> {
        info!(
            "Starting main event loop (decorations: {})",
            self.decorations.name()
        );
        loop {
            // Replies may have pulled events into x11rb's queue without the
            // socket becoming readable again
            self.pump_events()?;
            self.events.flush()?;

            let deadline = self.manager.next_composite_deadline();
            tokio::select! {
                () = self.events.wait_readable() => {}
                () = sleep_until(deadline) => {
                    self.manager.run_scheduled(Instant::now());
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, cleaning up...");
                    return Ok(());
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.manager.cleanup();
        if let Err(e) = self.conn.flush() {
            warn!("Failed to flush X11 connection on exit: {}", e);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_compositor=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Area Compositor");

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {:#}", e);
        Config::default()
    });

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut compositing = config.compositor.enabled;
    if args.iter().any(|arg| arg == "--compositing") {
        compositing = true;
    }
    if args.iter().any(|arg| arg == "--no-compositing") {
        compositing = false;
    }

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    let mut app = CompositorApp::new(&config, compositing)?;
    let result = app.run(&mut shutdown_rx).await;
    app.shutdown();

    if let Err(e) = &result {
        error!("Application error: {:#}", e);
    }
    result
}

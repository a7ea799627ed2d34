//! X11 Async Event Source
//!
//! Readiness of the X11 socket is polled with mio on a blocking thread and
//! forwarded to the tokio loop through a `Notify`. Events are then drained
//! from x11rb's buffer without blocking.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Notify};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const X11_TOKEN: mio::Token = mio::Token(0);

pub struct X11EventSource {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    // Dropping this closes the channel and stops the poll thread
    _alive: oneshot::Receiver<()>,
}

impl X11EventSource {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let readable = Arc::new(Notify::new());
        let thread_readable = readable.clone();
        let (alive_tx, alive_rx) = oneshot::channel::<()>();

        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
            .context("Failed to register X11 socket with mio")?;

        tokio::task::spawn_blocking(move || {
            let mut events = mio::Events::with_capacity(1);
            while !alive_tx.is_closed() {
                if let Err(err) = poll.poll(&mut events, Some(Duration::from_millis(100))) {
                    tracing::warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }
                if events.iter().any(|event| event.token() == X11_TOKEN) {
                    thread_readable.notify_one();
                }
            }
            tracing::debug!("X11 socket poll thread stopped");
        });

        Ok(Self {
            conn,
            readable,
            _alive: alive_rx,
        })
    }

    /// Take every event already queued, without blocking
    pub fn drain(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("X11 connection lost")?
        {
            events.push(event);
        }
        Ok(events)
    }

    /// Resolves once the socket has data for us
    pub async fn wait_readable(&self) {
        self.readable.notified().await;
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.flush().context("Failed to flush X11 connection")?;
        Ok(())
    }
}

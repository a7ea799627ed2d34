//! Area Compositor
//!
//! XRender compositing manager for the Area window manager: off-screen
//! window surfaces, damage tracking, throttled repaint scheduling and
//! window animations, with a graceful fallback to uncomposited mode.

pub mod compositor;
pub mod config;
pub mod decorations;
pub mod events;
pub mod shared;

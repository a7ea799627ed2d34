//! Types shared between the compositor core, event dispatch and decorations.

pub mod geometry;

pub use geometry::Geometry;

/// X11 window handle. Stable for the lifetime of the window.
pub type WindowId = u32;

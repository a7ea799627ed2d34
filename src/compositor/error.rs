//! Compositor error taxonomy

use thiserror::Error;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::ErrorKind;
use x11rb::x11_utils::X11Error;

use crate::compositor::LifecycleState;
use crate::shared::{Geometry, WindowId};

pub type CompositorResult<T> = std::result::Result<T, CompositorError>;

#[derive(Debug, Error)]
pub enum CompositorError {
    /// A required extension (or the overlay window) is missing
    #[error("{0} extension not available")]
    ExtensionUnavailable(&'static str),

    #[error("{name} extension {major}.{minor} is too old")]
    ExtensionTooOld {
        name: &'static str,
        major: u32,
        minor: u32,
    },

    #[error("{op} is not valid while the compositor is {state:?}")]
    InvalidState {
        op: &'static str,
        state: LifecycleState,
    },

    /// Failure confined to one window (it vanished, was unmapped under us, ...)
    #[error("window {window:#x}: {reason}")]
    Window { window: WindowId, reason: String },

    #[error("surface for window {window:#x} is {actual_width}x{actual_height}, geometry is {expected:?}")]
    SurfaceSizeMismatch {
        window: WindowId,
        expected: Geometry,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("X11 resource ids exhausted")]
    ResourcesExhausted,

    #[error("X11 connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X11 {kind:?} error in {request} (resource {resource:#x})")]
    X11 {
        kind: ErrorKind,
        request: &'static str,
        resource: u32,
    },

    #[error("compositing request failed: {0}")]
    Protocol(String),
}

impl CompositorError {
    /// Per-window transient failures. Everything else is systemic and
    /// degrades the compositor to fallback mode.
    pub fn is_window_scoped(&self) -> bool {
        matches!(
            self,
            CompositorError::Window { .. } | CompositorError::SurfaceSizeMismatch { .. }
        )
    }

    /// Attribute an X11 error to `window` when its kind says the window (or
    /// one of its drawables) went away or is not in a usable state.
    pub fn for_window(window: WindowId, err: impl Into<CompositorError>) -> Self {
        match err.into() {
            CompositorError::X11 { kind, request, resource } if is_window_error(kind) => {
                CompositorError::Window {
                    window,
                    reason: format!("{:?} in {} (resource {:#x})", kind, request, resource),
                }
            }
            other => other,
        }
    }
}

/// X11 error kinds that mean "this particular window/drawable is gone or
/// not viewable", as opposed to a broken extension.
pub fn is_window_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Window
            | ErrorKind::Drawable
            | ErrorKind::Match
            | ErrorKind::Pixmap
            | ErrorKind::DamageBadDamage
            | ErrorKind::RenderPicture
    )
}

impl From<X11Error> for CompositorError {
    fn from(err: X11Error) -> Self {
        CompositorError::X11 {
            kind: err.error_kind,
            request: err.request_name.unwrap_or("unknown request"),
            resource: err.bad_value,
        }
    }
}

impl From<ReplyError> for CompositorError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::ConnectionError(e) => CompositorError::Connection(e),
            ReplyError::X11Error(e) => e.into(),
        }
    }
}

impl From<ReplyOrIdError> for CompositorError {
    fn from(err: ReplyOrIdError) -> Self {
        match err {
            ReplyOrIdError::IdsExhausted => CompositorError::ResourcesExhausted,
            ReplyOrIdError::ConnectionError(e) => CompositorError::Connection(e),
            ReplyOrIdError::X11Error(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_scope_classification() {
        let err = CompositorError::Window {
            window: 0x400001,
            reason: "gone".into(),
        };
        assert!(err.is_window_scoped());
        assert!(!CompositorError::ResourcesExhausted.is_window_scoped());
        assert!(!CompositorError::Protocol("BadAlloc".into()).is_window_scoped());
    }

    #[test]
    fn test_for_window_rescopes_window_errors_only() {
        let bad_match = CompositorError::X11 {
            kind: ErrorKind::Match,
            request: "NameWindowPixmap",
            resource: 7,
        };
        match CompositorError::for_window(7, bad_match) {
            CompositorError::Window { window, reason } => {
                assert_eq!(window, 7);
                assert!(reason.contains("NameWindowPixmap"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let bad_alloc = CompositorError::X11 {
            kind: ErrorKind::Alloc,
            request: "CreatePixmap",
            resource: 0,
        };
        assert!(!CompositorError::for_window(7, bad_alloc).is_window_scoped());
    }
}

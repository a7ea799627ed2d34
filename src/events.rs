//! Events Module
//!
//! Routes X11 events to the compositing manager's entry points. Extension
//! events are recognised through a table keyed by response type, built once
//! from the Damage event base negotiated at initialization.

use std::collections::HashMap;

use tracing::{debug, trace};
use x11rb::protocol::damage;
use x11rb::protocol::Event;
use x11rb::x11_utils::X11Error;

use crate::compositor::backend::DisplayBackend;
use crate::compositor::error::is_window_error;
use crate::compositor::CompositingManager;
use crate::shared::{Geometry, WindowId};

/// Extension events the compositor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionEvent {
    DamageNotify,
}

/// Response type -> extension event
#[derive(Debug, Default, Clone)]
pub struct ExtensionEventTable {
    routes: HashMap<u8, ExtensionEvent>,
}

impl ExtensionEventTable {
    pub fn new(damage_event_base: u8) -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            damage_event_base.wrapping_add(damage::NOTIFY_EVENT),
            ExtensionEvent::DamageNotify,
        );
        Self { routes }
    }

    pub fn route(&self, response_type: u8) -> Option<ExtensionEvent> {
        self.routes.get(&(response_type & 0x7f)).copied()
    }
}

/// Extensions whose errors concern the compositor
const COMPOSITING_EXTENSIONS: [&str; 4] = ["Composite", "DAMAGE", "RENDER", "XFIXES"];

fn is_compositing_error(err: &X11Error) -> bool {
    err.extension_name
        .as_deref()
        .map(|name| {
            COMPOSITING_EXTENSIONS
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(name))
        })
        .unwrap_or(false)
}

/// Dispatch one event. Returns true if it was relevant to compositing.
pub fn dispatch_event<B: DisplayBackend>(
    manager: &mut CompositingManager<B>,
    table: &ExtensionEventTable,
    root: WindowId,
    event: &Event,
) -> bool {
    if let Some(kind) = table.route(event.response_type()) {
        return match (kind, event) {
            (ExtensionEvent::DamageNotify, Event::DamageNotify(e)) => {
                let area = Geometry::new(
                    e.area.x as i32,
                    e.area.y as i32,
                    e.area.width as u32,
                    e.area.height as u32,
                );
                trace!("DamageNotify for {:#x}: {:?}", e.drawable, area);
                manager.handle_damage_notify(e.drawable, Some(area));
                true
            }
            _ => false,
        };
    }

    match event {
        Event::CreateNotify(e) if e.parent == root => {
            if let Err(err) = manager.register_window(e.window) {
                debug!("Not compositing new window {:#x}: {}", e.window, err);
            }
            true
        }
        Event::DestroyNotify(e) => {
            manager.unregister_window(e.window);
            true
        }
        Event::MapNotify(e) if e.event == root => {
            manager.map_window(e.window);
            true
        }
        Event::UnmapNotify(e) if e.event == root => {
            manager.unmap_window(e.window);
            true
        }
        Event::ConfigureNotify(e) if e.event == root && e.window != root => {
            let geometry = Geometry::from_x11(e.x, e.y, e.width, e.height, e.border_width);
            manager.resize_window(e.window, geometry.x, geometry.y, geometry.width, geometry.height);
            // above_sibling may have changed
            manager.mark_stacking_order_dirty();
            true
        }
        Event::ReparentNotify(e) if e.event == root => {
            if e.parent == root {
                if let Err(err) = manager.register_window(e.window) {
                    debug!("Not compositing reparented window {:#x}: {}", e.window, err);
                }
            } else {
                manager.unregister_window(e.window);
            }
            true
        }
        Event::CirculateNotify(_) => {
            manager.mark_stacking_order_dirty();
            true
        }
        Event::Expose(e) if e.count == 0 => {
            manager.handle_expose_event(e.window);
            true
        }
        Event::Error(err) => {
            let window_scoped = is_window_error(err.error_kind);
            if is_compositing_error(err) {
                manager.handle_extension_error(err.bad_value, window_scoped);
                true
            } else if window_scoped {
                // Core request on a window that went away
                manager.handle_extension_error(err.bad_value, true);
                true
            } else {
                debug!("Ignoring X11 error unrelated to compositing: {:?}", err);
                false
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::testing::{MockBackend, DAMAGE_EVENT_BASE};
    use crate::compositor::CompositorSettings;
    use x11rb::protocol::damage::ReportLevel;
    use x11rb::protocol::xproto::{
        ConfigureNotifyEvent, MapNotifyEvent, Rectangle, UnmapNotifyEvent, CONFIGURE_NOTIFY_EVENT,
        MAP_NOTIFY_EVENT, UNMAP_NOTIFY_EVENT,
    };

    const ROOT: WindowId = 0x1;
    const WIN: WindowId = 0x400001;

    fn setup() -> (CompositingManager<MockBackend>, ExtensionEventTable) {
        let backend = MockBackend::new();
        backend
            .state
            .borrow_mut()
            .add_window(WIN, Geometry::new(0, 0, 64, 64), false);
        let mut manager = CompositingManager::new(CompositorSettings::default());
        let info = manager.initialize(backend).unwrap();
        manager.activate_compositing().unwrap();
        (manager, ExtensionEventTable::new(info.damage_event_base))
    }

    #[test]
    fn test_table_routes_damage_base() {
        let table = ExtensionEventTable::new(DAMAGE_EVENT_BASE);
        assert_eq!(table.route(DAMAGE_EVENT_BASE), Some(ExtensionEvent::DamageNotify));
        // send_event bit is ignored
        assert_eq!(
            table.route(DAMAGE_EVENT_BASE | 0x80),
            Some(ExtensionEvent::DamageNotify)
        );
        assert_eq!(table.route(MAP_NOTIFY_EVENT), None);
        assert_eq!(ExtensionEventTable::default().route(DAMAGE_EVENT_BASE), None);
    }

    #[test]
    fn test_map_and_unmap_notify() {
        let (mut manager, table) = setup();
        let map = Event::MapNotify(MapNotifyEvent {
            response_type: MAP_NOTIFY_EVENT,
            sequence: 0,
            event: ROOT,
            window: WIN,
            override_redirect: false,
        });
        assert!(dispatch_event(&mut manager, &table, ROOT, &map));
        assert_eq!(manager.stacking_order(), &[WIN]);

        let unmap = Event::UnmapNotify(UnmapNotifyEvent {
            response_type: UNMAP_NOTIFY_EVENT,
            sequence: 0,
            event: ROOT,
            window: WIN,
            from_configure: false,
        });
        assert!(dispatch_event(&mut manager, &table, ROOT, &unmap));
        assert!(manager.stacking_order().is_empty());
    }

    #[test]
    fn test_configure_notify_updates_geometry_and_stacking() {
        let (mut manager, table) = setup();
        let configure = Event::ConfigureNotify(ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: ROOT,
            window: WIN,
            above_sibling: 0,
            x: 10,
            y: 20,
            width: 100,
            height: 50,
            border_width: 1,
            override_redirect: false,
        });
        assert!(dispatch_event(&mut manager, &table, ROOT, &configure));
        assert_eq!(
            manager.window(WIN).unwrap().geometry,
            Geometry::new(10, 20, 102, 52)
        );
        assert!(manager.has_pending_composite());
    }

    #[test]
    fn test_damage_notify_is_routed_through_table() {
        let (mut manager, table) = setup();
        manager.perform_repair_now();
        assert!(!manager.is_damaged(WIN));

        let damage = Event::DamageNotify(damage::NotifyEvent {
            response_type: DAMAGE_EVENT_BASE,
            level: ReportLevel::NON_EMPTY,
            sequence: 0,
            drawable: WIN,
            damage: 0x200,
            timestamp: 0,
            area: Rectangle {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            },
            geometry: Rectangle {
                x: 0,
                y: 0,
                width: 64,
                height: 64,
            },
        });
        assert!(dispatch_event(&mut manager, &table, ROOT, &damage));
        assert!(manager.is_damaged(WIN));
    }
}

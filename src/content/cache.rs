//! Content Cache Module
//!
//! Process-wide weak map from window identity to its single shared content
//! handle. The cache is the only place allowed to construct a
//! `WindowContent`; consumers own it through `Rc` and the last drop tears
//! the native resources down. Weak entries mean the cache never keeps a
//! closed window's content alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;

use crate::backend::{BackendEvent, CompositeBackend, WindowHandle};
use crate::content::{ContentPolicy, WindowContent};
use crate::tracker::window::Window;
use crate::tracker::Tracker;

pub struct ContentCache {
    tracker: Rc<Tracker>,
    compositor: Rc<dyn CompositeBackend>,
    policy: ContentPolicy,
    entries: RefCell<HashMap<WindowHandle, Weak<WindowContent>>>,
    suspended: Cell<bool>,
}

impl ContentCache {
    pub fn new(
        tracker: Rc<Tracker>,
        compositor: Rc<dyn CompositeBackend>,
        policy: ContentPolicy,
    ) -> Self {
        Self {
            tracker,
            compositor,
            policy,
            entries: RefCell::new(HashMap::new()),
            suspended: Cell::new(false),
        }
    }

    /// Return the window's live content handle, or construct one. Two calls
    /// without an intervening drop share the same underlying content.
    pub fn get_or_create(&self, window: &Rc<Window>) -> Rc<WindowContent> {
        self.prune();

        let handle = window.handle();
        if let Some(existing) = self
            .entries
            .borrow()
            .get(&handle)
            .and_then(Weak::upgrade)
        {
            return existing;
        }

        // Asking for content of an untracked window is a caller bug, not an
        // environmental condition.
        debug_assert!(
            self.tracker.window_by_handle(handle).is_some(),
            "content requested for untracked window {handle}"
        );

        let content = WindowContent::new(
            Rc::clone(window),
            &self.tracker,
            Rc::clone(&self.compositor),
            self.policy,
            self.suspended.get(),
        );
        self.entries
            .borrow_mut()
            .insert(handle, Rc::downgrade(&content));
        debug!("Created content for window {}", handle);
        content
    }

    /// Route compositing-backend notifications to the affected content
    pub fn handle_backend_event(&self, event: &BackendEvent) {
        match *event {
            BackendEvent::WindowDamaged(handle) => {
                let content = self.entries.borrow().get(&handle).and_then(Weak::upgrade);
                if let Some(content) = content {
                    content.handle_damage();
                }
            }
            BackendEvent::WindowClosed(handle) => {
                self.entries.borrow_mut().remove(&handle);
            }
            _ => {}
        }
    }

    /// Overlay-wide suspend: every live content releases its native
    /// resources until resumed
    pub fn set_suspended(&self, suspended: bool) {
        if self.suspended.replace(suspended) == suspended {
            return;
        }
        let live: Vec<Rc<WindowContent>> = self
            .entries
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for content in live {
            content.set_app_suspended(suspended);
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    /// Number of contents currently kept alive by consumers
    pub fn live_count(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Drop map entries whose content has been released by every consumer
    fn prune(&self) {
        self.entries
            .borrow_mut()
            .retain(|_, weak| weak.strong_count() > 0);
    }
}

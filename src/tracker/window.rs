//! Window Module
//!
//! Facade over one managed window. Holds the cached state/action bitsets and
//! the last-known geometry; translates uniform operations into backend
//! primitives. All cache writes happen inside the tracker's event handlers,
//! so every other component sees a consistent single-writer view.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::apps::{AppEntry, AppIndex};
use crate::backend::{DesktopBackend, IconData, WindowActions, WindowHandle, WindowStates};
use crate::shared::Geometry;
use crate::tracker::monitor::Monitor;
use crate::tracker::workspace::Workspace;
use crate::tracker::Tracker;

pub struct Window {
    backend: Rc<dyn DesktopBackend>,
    tracker: Weak<Tracker>,
    handle: WindowHandle,
    name: RefCell<String>,
    state: Cell<WindowStates>,
    actions: Cell<WindowActions>,
    /// Last geometry seen at open or at the previous accepted change; only
    /// used to suppress spurious backend notifications
    geometry: Cell<Geometry>,
    workspace: RefCell<Weak<Workspace>>,
    transient_for: Cell<Option<WindowHandle>>,
}

impl Window {
    pub(crate) fn new(
        backend: Rc<dyn DesktopBackend>,
        tracker: Weak<Tracker>,
        handle: WindowHandle,
    ) -> Self {
        let name = backend.window_name(handle);
        let state = backend.window_state(handle);
        let actions = backend.window_actions(handle);
        let geometry = backend.window_geometry(handle).unwrap_or_default();
        let transient_for = backend.window_transient_for(handle);
        Self {
            backend,
            tracker,
            handle,
            name: RefCell::new(name),
            state: Cell::new(state),
            actions: Cell::new(actions),
            geometry: Cell::new(geometry),
            workspace: RefCell::new(Weak::new()),
            transient_for: Cell::new(transient_for),
        }
    }

    /// Opaque native handle; the window's identity
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn state(&self) -> WindowStates {
        self.state.get()
    }

    pub fn actions(&self) -> WindowActions {
        self.actions.get()
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry.get()
    }

    pub fn workspace(&self) -> Option<Rc<Workspace>> {
        self.workspace.borrow().upgrade()
    }

    /// The window this one is transient for, if it is still tracked
    pub fn transient_for(&self) -> Option<Rc<Window>> {
        let parent = self.transient_for.get()?;
        self.tracker.upgrade()?.window_by_handle(parent)
    }

    pub fn is_minimized(&self) -> bool {
        self.state.get().contains(WindowStates::MINIMIZED)
    }

    pub fn is_urgent(&self) -> bool {
        self.state.get().contains(WindowStates::URGENT)
    }

    /// Whether the overlay should present this window at all
    pub fn is_listed(&self) -> bool {
        !self.state.get().contains(WindowStates::SKIP_TASKLIST)
    }

    pub fn can_close(&self) -> bool {
        self.actions.get().contains(WindowActions::CLOSE)
    }

    pub fn can_minimize(&self) -> bool {
        self.actions.get().contains(WindowActions::MINIMIZE)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    pub fn show(&self) {
        self.backend.show_window(self.handle);
    }

    pub fn hide(&self) {
        self.backend.hide_window(self.handle);
    }

    /// Raise and focus the window, stamped with the last user-input time
    pub fn activate(&self) {
        let timestamp = self.backend.last_input_time();
        self.backend.activate_window(self.handle, timestamp);
    }

    pub fn close(&self) {
        let timestamp = self.backend.last_input_time();
        self.backend.close_window(self.handle, timestamp);
    }

    pub fn move_to(&self, x: i32, y: i32) {
        self.backend
            .move_resize_window(self.handle, Some(x), Some(y), None, None);
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.backend
            .move_resize_window(self.handle, None, None, Some(width), Some(height));
    }

    pub fn move_resize(&self, x: i32, y: i32, width: u32, height: u32) {
        self.backend
            .move_resize_window(self.handle, Some(x), Some(y), Some(width), Some(height));
    }

    /// Request the given state bitset, translating each changed semantic bit
    /// to its backend call. The cached bitset is not touched here; it updates
    /// when the backend's own state-changed echo arrives.
    pub fn set_state(&self, target: WindowStates) {
        const REQUESTABLE: [WindowStates; 7] = [
            WindowStates::MINIMIZED,
            WindowStates::MAXIMIZED,
            WindowStates::FULLSCREEN,
            WindowStates::PINNED,
            WindowStates::SKIP_PAGER,
            WindowStates::SKIP_TASKLIST,
            WindowStates::URGENT,
        ];
        let current = self.state.get();
        let changed = current ^ target;
        for bit in REQUESTABLE {
            if changed.contains(bit) {
                self.backend
                    .request_state(self.handle, bit, target.contains(bit));
            }
        }
    }

    /// Move the window to a workspace by number
    pub fn set_workspace(&self, workspace: u32) {
        self.backend.set_window_workspace(self.handle, workspace);
    }

    /// Show the window on every workspace
    pub fn pin(&self) {
        self.set_state(self.state.get() | WindowStates::PINNED);
    }

    pub fn unpin(&self) {
        self.set_state(self.state.get() - WindowStates::PINNED);
    }

    /// Monitor containing the window's clamped midpoint, if any
    pub fn get_monitor(&self) -> Option<Rc<Monitor>> {
        self.tracker
            .upgrade()?
            .monitor_for_geometry(self.geometry.get())
    }

    /// Identify the installed application that spawned this window
    pub fn resolve_application(&self, index: &AppIndex) -> Option<Rc<AppEntry>> {
        crate::apps::resolve::resolve_window_application(self, index)
    }

    pub fn icon(&self) -> Option<IconData> {
        self.backend.window_icon(self.handle)
    }

    // ------------------------------------------------------------------
    // Backend passthrough queries used by application resolution
    // ------------------------------------------------------------------

    pub fn application_id(&self) -> Option<String> {
        self.backend.window_application_id(self.handle)
    }

    /// Resource class (group) name
    pub fn class_group(&self) -> Option<String> {
        self.backend.window_class(self.handle).0
    }

    /// Resource instance name
    pub fn class_instance(&self) -> Option<String> {
        self.backend.window_class(self.handle).1
    }

    pub fn pid(&self) -> Option<u32> {
        self.backend.window_pid(self.handle)
    }

    // ------------------------------------------------------------------
    // Cache writes, tracker only
    // ------------------------------------------------------------------

    pub(crate) fn set_cached_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    pub(crate) fn set_cached_state(&self, state: WindowStates) {
        self.state.set(state);
    }

    pub(crate) fn set_cached_actions(&self, actions: WindowActions) {
        self.actions.set(actions);
    }

    pub(crate) fn set_cached_geometry(&self, geometry: Geometry) {
        self.geometry.set(geometry);
    }

    pub(crate) fn set_cached_workspace(&self, workspace: Weak<Workspace>) {
        *self.workspace.borrow_mut() = workspace;
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("handle", &self.handle)
            .field("name", &self.name.borrow())
            .field("state", &self.state.get())
            .finish()
    }
}

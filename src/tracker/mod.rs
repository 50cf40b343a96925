//! Tracker Module
//!
//! Single source of truth for what windows, workspaces and monitors exist
//! right now. Subscribes to the raw backend notifications, normalizes them
//! (deduplication, spurious-geometry suppression, monitor assignment) and
//! re-publishes them as domain events on one typed signal bus.

pub mod events;
pub mod monitor;
pub mod window;
pub mod workspace;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::backend::{BackendEvent, DesktopBackend, WindowHandle};
use crate::shared::{clamp_to_desktop, Geometry};
use events::{Signal, TrackerEvent};
use monitor::Monitor;
use window::Window;
use workspace::Workspace;

pub struct Tracker {
    backend: Rc<dyn DesktopBackend>,
    /// Creation order
    windows: RefCell<Vec<Rc<Window>>>,
    /// Bottom-to-top stacking order, as last reported by the backend
    stacking: RefCell<Vec<WindowHandle>>,
    workspaces: RefCell<Vec<Rc<Workspace>>>,
    monitors: RefCell<Vec<Rc<Monitor>>>,
    active_window: RefCell<Option<Rc<Window>>>,
    active_workspace: RefCell<Option<Rc<Workspace>>>,
    primary_monitor: RefCell<Option<Rc<Monitor>>>,
    screen_size: Cell<(u32, u32)>,
    events: Signal<TrackerEvent>,
}

impl Tracker {
    pub fn new(backend: Rc<dyn DesktopBackend>) -> Rc<Self> {
        Rc::new(Self {
            backend,
            windows: RefCell::new(Vec::new()),
            stacking: RefCell::new(Vec::new()),
            workspaces: RefCell::new(Vec::new()),
            monitors: RefCell::new(Vec::new()),
            active_window: RefCell::new(None),
            active_workspace: RefCell::new(None),
            primary_monitor: RefCell::new(None),
            screen_size: Cell::new((0, 0)),
            events: Signal::new(),
        })
    }

    /// Mirror the backend's current state, emitting the same events a
    /// subscriber would have seen had it been present from session start.
    /// Call after all initial subscribers are connected.
    pub fn sync_initial(self: &Rc<Self>) {
        let (width, height) = self.backend.screen_size();
        self.screen_size.set((width, height));

        for info in self.backend.workspaces() {
            self.add_workspace(info.number, info.name, info.width, info.height);
        }
        self.refresh_monitors();
        for handle in self.backend.windows() {
            self.open_window(handle);
        }
        *self.stacking.borrow_mut() = self.backend.windows_stacked();
        self.refresh_active_workspace();
        self.refresh_active_window();
    }

    /// The domain-event bus; the tracker is its only publisher
    pub fn events(&self) -> &Signal<TrackerEvent> {
        &self.events
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    /// Live windows in creation order
    pub fn windows(&self) -> Vec<Rc<Window>> {
        self.windows.borrow().clone()
    }

    /// Live windows in bottom-to-top stacking order
    pub fn windows_stacked(&self) -> Vec<Rc<Window>> {
        let stacking = self.stacking.borrow();
        stacking
            .iter()
            .filter_map(|&h| self.window_by_handle(h))
            .collect()
    }

    pub fn active_window(&self) -> Option<Rc<Window>> {
        self.active_window.borrow().clone()
    }

    pub fn active_workspace(&self) -> Option<Rc<Workspace>> {
        self.active_workspace.borrow().clone()
    }

    pub fn primary_monitor(&self) -> Option<Rc<Monitor>> {
        self.primary_monitor.borrow().clone()
    }

    pub fn workspaces(&self) -> Vec<Rc<Workspace>> {
        self.workspaces.borrow().clone()
    }

    pub fn monitors(&self) -> Vec<Rc<Monitor>> {
        self.monitors.borrow().clone()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen_size.get()
    }

    pub fn window_by_handle(&self, handle: WindowHandle) -> Option<Rc<Window>> {
        self.windows
            .borrow()
            .iter()
            .find(|w| w.handle() == handle)
            .cloned()
    }

    pub fn workspace_by_number(&self, number: u32) -> Option<Rc<Workspace>> {
        self.workspaces
            .borrow()
            .iter()
            .find(|ws| ws.number() == number)
            .cloned()
    }

    /// Monitor containing the clamped midpoint of a rectangle. A point on no
    /// monitor yields None, never an error.
    pub fn monitor_for_geometry(&self, geometry: Geometry) -> Option<Rc<Monitor>> {
        let (width, height) = self.screen_size.get();
        let (mx, my) = geometry.midpoint();
        let (mx, my) = clamp_to_desktop(mx, my, width, height);
        self.monitors
            .borrow()
            .iter()
            .find(|m| m.contains(mx, my))
            .cloned()
    }

    // ------------------------------------------------------------------
    // Backend event normalization
    // ------------------------------------------------------------------

    pub fn handle_event(self: &Rc<Self>, event: &BackendEvent) {
        match *event {
            BackendEvent::WindowOpened(handle) => self.open_window(handle),
            BackendEvent::WindowClosed(handle) => self.close_window(handle),
            BackendEvent::WindowGeometryChanged(handle) => self.window_geometry_changed(handle),
            BackendEvent::WindowStateChanged(handle) => self.window_state_changed(handle),
            BackendEvent::WindowActionsChanged(handle) => self.window_actions_changed(handle),
            BackendEvent::WindowNameChanged(handle) => self.window_name_changed(handle),
            BackendEvent::WindowIconChanged(handle) => {
                if let Some(window) = self.window_by_handle(handle) {
                    self.events.emit(&TrackerEvent::WindowIconChanged(window));
                }
            }
            BackendEvent::WindowWorkspaceChanged(handle) => self.window_workspace_changed(handle),
            // Damage belongs to the content engine, not the desktop model
            BackendEvent::WindowDamaged(_) => {}
            BackendEvent::StackingChanged => {
                *self.stacking.borrow_mut() = self.backend.windows_stacked();
                self.events.emit(&TrackerEvent::StackingChanged);
            }
            BackendEvent::ActiveWindowChanged => self.refresh_active_window(),
            BackendEvent::WorkspaceAdded(number) => {
                let info = self
                    .backend
                    .workspaces()
                    .into_iter()
                    .find(|i| i.number == number);
                match info {
                    Some(info) => self.add_workspace(number, info.name, info.width, info.height),
                    None => {
                        let (width, height) = self.screen_size.get();
                        self.add_workspace(
                            number,
                            format!("Workspace {}", number + 1),
                            width,
                            height,
                        );
                    }
                }
            }
            BackendEvent::WorkspaceRemoved(number) => self.remove_workspace(number),
            BackendEvent::WorkspaceRenamed(number) => self.rename_workspace(number),
            BackendEvent::ActiveWorkspaceChanged => self.refresh_active_workspace(),
            BackendEvent::MonitorLayoutChanged => self.refresh_monitors(),
            BackendEvent::ScreenSizeChanged { width, height } => {
                self.screen_size.set((width, height));
                for workspace in self.workspaces.borrow().iter() {
                    workspace.set_size(width, height);
                }
                self.events
                    .emit(&TrackerEvent::ScreenSizeChanged { width, height });
            }
        }
    }

    fn open_window(self: &Rc<Self>, handle: WindowHandle) {
        if self.window_by_handle(handle).is_some() {
            // The backend layer is known to fire spurious notifications
            debug!("Ignoring duplicate open for window {}", handle);
            return;
        }
        let window = Rc::new(Window::new(
            Rc::clone(&self.backend),
            Rc::downgrade(self),
            handle,
        ));
        if let Some(number) = self.backend.window_workspace(handle) {
            if let Some(workspace) = self.workspace_by_number(number) {
                window.set_cached_workspace(Rc::downgrade(&workspace));
            }
        }
        self.windows.borrow_mut().push(Rc::clone(&window));
        self.stacking.borrow_mut().push(handle);
        debug!("Window {} opened ({})", handle, window.name());
        self.events.emit(&TrackerEvent::WindowOpened(window));
    }

    fn close_window(self: &Rc<Self>, handle: WindowHandle) {
        let window = {
            let mut windows = self.windows.borrow_mut();
            match windows.iter().position(|w| w.handle() == handle) {
                Some(index) => windows.remove(index),
                None => {
                    debug!("Ignoring close for unknown window {}", handle);
                    return;
                }
            }
        };
        self.stacking.borrow_mut().retain(|&h| h != handle);
        // The backend reports the active-window change separately; just make
        // sure the cache cannot point at a removed entry in the meantime.
        let was_active = self
            .active_window
            .borrow()
            .as_ref()
            .map(|w| w.handle() == handle)
            .unwrap_or(false);
        if was_active {
            *self.active_window.borrow_mut() = None;
        }
        debug!("Window {} closed", handle);
        self.events.emit(&TrackerEvent::WindowClosed(window));
    }

    fn window_geometry_changed(self: &Rc<Self>, handle: WindowHandle) {
        let window = match self.window_by_handle(handle) {
            Some(window) => window,
            None => return,
        };
        let new = match self.backend.window_geometry(handle) {
            Ok(geometry) => geometry,
            Err(e) => {
                debug!("Geometry query for {} failed: {}", handle, e);
                return;
            }
        };
        let old = window.geometry();
        if new == old {
            // Spurious notification; nothing actually moved
            return;
        }
        let old_monitor = self.monitor_for_geometry(old);
        window.set_cached_geometry(new);
        let new_monitor = self.monitor_for_geometry(new);
        self.events
            .emit(&TrackerEvent::WindowGeometryChanged(Rc::clone(&window)));

        let old_index = old_monitor.as_ref().map(|m| m.index());
        let new_index = new_monitor.as_ref().map(|m| m.index());
        if old_index != new_index {
            self.events.emit(&TrackerEvent::WindowMonitorChanged {
                window,
                old: old_monitor,
                new: new_monitor,
            });
        }
    }

    fn window_state_changed(self: &Rc<Self>, handle: WindowHandle) {
        let window = match self.window_by_handle(handle) {
            Some(window) => window,
            None => return,
        };
        // Recompute the whole bitset from the backend; never patch
        let new = self.backend.window_state(handle);
        let old = window.state();
        if new == old {
            return;
        }
        window.set_cached_state(new);
        self.events.emit(&TrackerEvent::WindowStateChanged {
            window,
            old,
            new,
        });
    }

    fn window_actions_changed(self: &Rc<Self>, handle: WindowHandle) {
        let window = match self.window_by_handle(handle) {
            Some(window) => window,
            None => return,
        };
        let new = self.backend.window_actions(handle);
        let old = window.actions();
        if new == old {
            return;
        }
        window.set_cached_actions(new);
        self.events.emit(&TrackerEvent::WindowActionsChanged {
            window,
            old,
            new,
        });
    }

    fn window_name_changed(self: &Rc<Self>, handle: WindowHandle) {
        let window = match self.window_by_handle(handle) {
            Some(window) => window,
            None => return,
        };
        let new = self.backend.window_name(handle);
        if new == window.name() {
            return;
        }
        window.set_cached_name(new);
        self.events.emit(&TrackerEvent::WindowNameChanged(window));
    }

    fn window_workspace_changed(self: &Rc<Self>, handle: WindowHandle) {
        let window = match self.window_by_handle(handle) {
            Some(window) => window,
            None => return,
        };
        let workspace = self
            .backend
            .window_workspace(handle)
            .and_then(|n| self.workspace_by_number(n));
        match &workspace {
            Some(ws) => window.set_cached_workspace(Rc::downgrade(ws)),
            None => window.set_cached_workspace(std::rc::Weak::new()),
        }
        self.events
            .emit(&TrackerEvent::WindowWorkspaceChanged { window, workspace });
    }

    /// Update the cached active window, then tell subscribers. The order
    /// guarantees a listener never observes a stale `active_window()`
    /// alongside a fresh changed event.
    fn refresh_active_window(self: &Rc<Self>) {
        let new = self
            .backend
            .active_window()
            .and_then(|h| self.window_by_handle(h));
        let old = self.active_window.borrow().clone();
        let old_handle = old.as_ref().map(|w| w.handle());
        let new_handle = new.as_ref().map(|w| w.handle());
        if old_handle == new_handle {
            return;
        }
        *self.active_window.borrow_mut() = new.clone();
        self.events
            .emit(&TrackerEvent::ActiveWindowChanged { old, new });
    }

    fn refresh_active_workspace(self: &Rc<Self>) {
        let new = self
            .backend
            .active_workspace()
            .and_then(|n| self.workspace_by_number(n));
        let old = self.active_workspace.borrow().clone();
        let old_number = old.as_ref().map(|ws| ws.number());
        let new_number = new.as_ref().map(|ws| ws.number());
        if old_number == new_number {
            return;
        }
        *self.active_workspace.borrow_mut() = new.clone();
        self.events
            .emit(&TrackerEvent::ActiveWorkspaceChanged { old, new });
    }

    fn add_workspace(self: &Rc<Self>, number: u32, name: String, width: u32, height: u32) {
        if self.workspace_by_number(number).is_some() {
            debug!("Ignoring duplicate add for workspace {}", number);
            return;
        }
        let workspace = Rc::new(Workspace::new(number, name, width, height));
        {
            let mut workspaces = self.workspaces.borrow_mut();
            workspaces.push(Rc::clone(&workspace));
            workspaces.sort_by_key(|ws| ws.number());
        }
        self.events.emit(&TrackerEvent::WorkspaceAdded(workspace));
    }

    fn remove_workspace(self: &Rc<Self>, number: u32) {
        let workspace = {
            let mut workspaces = self.workspaces.borrow_mut();
            match workspaces.iter().position(|ws| ws.number() == number) {
                Some(index) => workspaces.remove(index),
                None => return,
            }
        };
        let was_active = self
            .active_workspace
            .borrow()
            .as_ref()
            .map(|ws| ws.number() == number)
            .unwrap_or(false);
        if was_active {
            *self.active_workspace.borrow_mut() = None;
        }
        self.events.emit(&TrackerEvent::WorkspaceRemoved(workspace));
    }

    fn rename_workspace(self: &Rc<Self>, number: u32) {
        let workspace = match self.workspace_by_number(number) {
            Some(workspace) => workspace,
            None => return,
        };
        let name = self
            .backend
            .workspaces()
            .into_iter()
            .find(|i| i.number == number)
            .map(|i| i.name);
        match name {
            Some(name) if name != workspace.name() => {
                workspace.set_name(name);
                self.events.emit(&TrackerEvent::WorkspaceRenamed(workspace));
            }
            _ => {}
        }
    }

    /// Reconcile the monitor list with the display backend: geometry and
    /// primary flags mutate in place, count changes create or destroy.
    fn refresh_monitors(self: &Rc<Self>) {
        let infos = self.backend.monitors();
        if infos.is_empty() {
            warn!("Display backend reported no monitors");
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut resized = Vec::new();
        {
            let mut monitors = self.monitors.borrow_mut();
            let common = monitors.len().min(infos.len());
            for (monitor, info) in monitors.iter().zip(infos.iter()).take(common) {
                if monitor.geometry() != info.geometry {
                    monitor.set_geometry(info.geometry);
                    resized.push(Rc::clone(monitor));
                }
                monitor.set_primary(info.primary);
            }
            for (index, info) in infos.iter().enumerate().skip(common) {
                let monitor = Rc::new(Monitor::new(index, info.geometry, info.primary));
                monitors.push(Rc::clone(&monitor));
                added.push(monitor);
            }
            while monitors.len() > infos.len() {
                removed.push(monitors.remove(infos.len()));
            }
        }

        // Primary cache updates before its changed event goes out
        let new_primary = self
            .monitors
            .borrow()
            .iter()
            .find(|m| m.is_primary())
            .cloned();
        let old_primary_index = self.primary_monitor.borrow().as_ref().map(|m| m.index());
        let primary_changed = new_primary.as_ref().map(|m| m.index()) != old_primary_index
            || self
                .primary_monitor
                .borrow()
                .as_ref()
                .map(|m| !m.is_primary())
                .unwrap_or(false);
        *self.primary_monitor.borrow_mut() = new_primary.clone();

        for monitor in added {
            self.events.emit(&TrackerEvent::MonitorAdded(monitor));
        }
        for monitor in removed {
            self.events.emit(&TrackerEvent::MonitorRemoved(monitor));
        }
        for monitor in resized {
            self.events
                .emit(&TrackerEvent::MonitorGeometryChanged(monitor));
        }
        if primary_changed {
            if let Some(primary) = new_primary {
                self.events
                    .emit(&TrackerEvent::PrimaryMonitorChanged(primary));
            }
        }
    }
}

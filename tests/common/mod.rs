//! Scripted in-memory backend for driving the tracker and content engine.
//!
//! Desktop queries read from mutable fake state; commands are recorded in an
//! op log instead of mutating anything, so tests decide when (and whether)
//! the window manager "echoes" a change back.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use skylight::backend::{
    BackendError, CompositeBackend, ContentError, DesktopBackend, IconData, MonitorInfo, Texture,
    WindowActions, WindowHandle, WindowStates, WindowSurface, WorkspaceInfo,
};
use skylight::shared::Geometry;

/// A command the tracker or content engine issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Show(WindowHandle),
    Hide(WindowHandle),
    Activate(WindowHandle, u32),
    Close(WindowHandle, u32),
    MoveResize(WindowHandle),
    RequestState(WindowHandle, WindowStates, bool),
    SetWorkspace(WindowHandle, u32),
    AcquireSurface(WindowHandle),
    ReleaseSurface(WindowHandle),
    CreateDamage(WindowHandle),
    ReleaseDamage(u32),
    Snapshot(u32),
    UploadIcon,
    ReleaseTexture(u32),
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub name: String,
    pub state: WindowStates,
    pub actions: WindowActions,
    pub geometry: Geometry,
    pub workspace: Option<u32>,
    pub transient_for: Option<WindowHandle>,
    pub class_group: Option<String>,
    pub class_instance: Option<String>,
    pub pid: Option<u32>,
    pub application_id: Option<String>,
    pub has_icon: bool,
}

#[derive(Default)]
pub struct FakeState {
    pub windows: Vec<FakeWindow>,
    pub stacking: Vec<WindowHandle>,
    pub active_window: Option<WindowHandle>,
    pub workspaces: Vec<WorkspaceInfo>,
    pub active_workspace: Option<u32>,
    pub monitors: Vec<MonitorInfo>,
    pub screen: (u32, u32),
    pub time: u32,
    /// Every surface acquisition fails with a protocol error
    pub fail_acquire: bool,
    /// Damage objects are unavailable (extension missing)
    pub no_damage: bool,
    next_id: u32,
}

pub struct FakeBackend {
    pub state: RefCell<FakeState>,
    pub ops: RefCell<Vec<Op>>,
}

impl FakeBackend {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(FakeState {
                screen: (1920, 1080),
                monitors: vec![MonitorInfo {
                    geometry: Geometry::new(0, 0, 1920, 1080),
                    primary: true,
                }],
                workspaces: vec![WorkspaceInfo {
                    number: 0,
                    name: "Workspace 1".into(),
                    width: 1920,
                    height: 1080,
                }],
                active_workspace: Some(0),
                time: 1000,
                ..FakeState::default()
            }),
            ops: RefCell::new(Vec::new()),
        })
    }

    pub fn add_window(&self, handle: u32, name: &str, geometry: Geometry) -> WindowHandle {
        let handle = WindowHandle(handle);
        self.state.borrow_mut().windows.push(FakeWindow {
            handle,
            name: name.into(),
            state: WindowStates::empty(),
            actions: WindowActions::all(),
            geometry,
            workspace: Some(0),
            transient_for: None,
            class_group: None,
            class_instance: None,
            pid: None,
            application_id: None,
            has_icon: true,
        });
        self.state.borrow_mut().stacking.push(handle);
        handle
    }

    pub fn remove_window(&self, handle: WindowHandle) {
        let mut state = self.state.borrow_mut();
        state.windows.retain(|w| w.handle != handle);
        state.stacking.retain(|&h| h != handle);
    }

    pub fn with_window<R>(&self, handle: WindowHandle, f: impl FnOnce(&mut FakeWindow) -> R) -> R {
        let mut state = self.state.borrow_mut();
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.handle == handle)
            .expect("fake window missing");
        f(window)
    }

    pub fn set_minimized(&self, handle: WindowHandle, minimized: bool) {
        self.with_window(handle, |w| {
            if minimized {
                w.state |= WindowStates::MINIMIZED | WindowStates::HIDDEN;
            } else {
                w.state -= WindowStates::MINIMIZED | WindowStates::HIDDEN;
            }
        });
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    fn record(&self, op: Op) {
        self.ops.borrow_mut().push(op);
    }

    fn next_id(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }
}

impl DesktopBackend for FakeBackend {
    fn windows(&self) -> Vec<WindowHandle> {
        self.state.borrow().windows.iter().map(|w| w.handle).collect()
    }

    fn windows_stacked(&self) -> Vec<WindowHandle> {
        self.state.borrow().stacking.clone()
    }

    fn active_window(&self) -> Option<WindowHandle> {
        self.state.borrow().active_window
    }

    fn workspaces(&self) -> Vec<WorkspaceInfo> {
        self.state.borrow().workspaces.clone()
    }

    fn active_workspace(&self) -> Option<u32> {
        self.state.borrow().active_workspace
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        self.state.borrow().monitors.clone()
    }

    fn screen_size(&self) -> (u32, u32) {
        self.state.borrow().screen
    }

    fn window_geometry(&self, window: WindowHandle) -> Result<Geometry, BackendError> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .map(|w| w.geometry)
            .ok_or(BackendError::WindowGone(window))
    }

    fn window_state(&self, window: WindowHandle) -> WindowStates {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .map(|w| w.state)
            .unwrap_or_default()
    }

    fn window_actions(&self, window: WindowHandle) -> WindowActions {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .map(|w| w.actions)
            .unwrap_or_default()
    }

    fn window_name(&self, window: WindowHandle) -> String {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .map(|w| w.name.clone())
            .unwrap_or_default()
    }

    fn window_workspace(&self, window: WindowHandle) -> Option<u32> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .and_then(|w| w.workspace)
    }

    fn window_transient_for(&self, window: WindowHandle) -> Option<WindowHandle> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .and_then(|w| w.transient_for)
    }

    fn window_class(&self, window: WindowHandle) -> (Option<String>, Option<String>) {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .map(|w| (w.class_group.clone(), w.class_instance.clone()))
            .unwrap_or((None, None))
    }

    fn window_pid(&self, window: WindowHandle) -> Option<u32> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .and_then(|w| w.pid)
    }

    fn window_application_id(&self, window: WindowHandle) -> Option<String> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .and_then(|w| w.application_id.clone())
    }

    fn window_icon(&self, window: WindowHandle) -> Option<IconData> {
        let has_icon = self
            .state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .map(|w| w.has_icon)
            .unwrap_or(false);
        has_icon.then(|| IconData {
            width: 32,
            height: 32,
            pixels: vec![0xff00_00ff; 32 * 32],
        })
    }

    fn last_input_time(&self) -> u32 {
        self.state.borrow().time
    }

    fn show_window(&self, window: WindowHandle) {
        self.record(Op::Show(window));
    }

    fn hide_window(&self, window: WindowHandle) {
        self.record(Op::Hide(window));
    }

    fn activate_window(&self, window: WindowHandle, timestamp: u32) {
        self.record(Op::Activate(window, timestamp));
    }

    fn close_window(&self, window: WindowHandle, timestamp: u32) {
        self.record(Op::Close(window, timestamp));
    }

    fn move_resize_window(
        &self,
        window: WindowHandle,
        _x: Option<i32>,
        _y: Option<i32>,
        _width: Option<u32>,
        _height: Option<u32>,
    ) {
        self.record(Op::MoveResize(window));
    }

    fn request_state(&self, window: WindowHandle, state: WindowStates, enable: bool) {
        self.record(Op::RequestState(window, state, enable));
    }

    fn set_window_workspace(&self, window: WindowHandle, workspace: u32) {
        self.record(Op::SetWorkspace(window, workspace));
    }
}

impl CompositeBackend for FakeBackend {
    fn acquire_surface(&self, window: WindowHandle) -> Result<WindowSurface, ContentError> {
        self.record(Op::AcquireSurface(window));
        if self.state.borrow().fail_acquire {
            return Err(ContentError::Protocol("scripted failure".into()));
        }
        let fake = self
            .state
            .borrow()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .cloned()
            .ok_or(ContentError::NotViewable(window))?;
        if fake.state.contains(WindowStates::MINIMIZED) {
            // A minimized window has no viewable pixmap
            return Err(ContentError::NotViewable(window));
        }
        Ok(WindowSurface {
            pixmap: self.next_id(),
            texture: Texture {
                drawable: self.next_id(),
                width: fake.geometry.width,
                height: fake.geometry.height,
            },
        })
    }

    fn release_surface(&self, window: WindowHandle, _surface: WindowSurface) {
        self.record(Op::ReleaseSurface(window));
    }

    fn create_damage(&self, window: WindowHandle) -> Result<u32, ContentError> {
        self.record(Op::CreateDamage(window));
        if self.state.borrow().no_damage {
            return Err(ContentError::Unavailable("damage extension missing"));
        }
        Ok(self.next_id())
    }

    fn release_damage(&self, damage: u32) {
        self.record(Op::ReleaseDamage(damage));
    }

    fn snapshot_texture(&self, texture: &Texture) -> Result<Texture, ContentError> {
        self.record(Op::Snapshot(texture.drawable));
        Ok(Texture {
            drawable: self.next_id(),
            width: texture.width,
            height: texture.height,
        })
    }

    fn upload_icon(&self, icon: &IconData) -> Result<Texture, ContentError> {
        self.record(Op::UploadIcon);
        Ok(Texture {
            drawable: self.next_id(),
            width: icon.width,
            height: icon.height,
        })
    }

    fn release_texture(&self, texture: Texture) {
        self.record(Op::ReleaseTexture(texture.drawable));
    }
}

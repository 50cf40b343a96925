//! Backend Module
//!
//! Trait seams over the window-management and compositing sides of the
//! display server, plus the raw event vocabulary they deliver. The tracker
//! and content engine only ever talk to these traits; the X11 implementation
//! lives in `backend::x11`.

pub mod x11;

use bitflags::bitflags;
use thiserror::Error;

use crate::shared::Geometry;

/// Opaque native window identity, stable for the window's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

bitflags! {
    /// Window state bits mirrored from the window manager
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowStates: u32 {
        const HIDDEN        = 1 << 0;
        const MINIMIZED     = 1 << 1;
        const MAXIMIZED     = 1 << 2;
        const FULLSCREEN    = 1 << 3;
        const SKIP_PAGER    = 1 << 4;
        const SKIP_TASKLIST = 1 << 5;
        const URGENT        = 1 << 6;
        const PINNED        = 1 << 7;
    }
}

bitflags! {
    /// Actions the window manager permits on a window
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowActions: u32 {
        const CLOSE            = 1 << 0;
        const MINIMIZE         = 1 << 1;
        const MAXIMIZE         = 1 << 2;
        const FULLSCREEN       = 1 << 3;
        const MOVE             = 1 << 4;
        const RESIZE           = 1 << 5;
        const CHANGE_WORKSPACE = 1 << 6;
        const STICK            = 1 << 7;
    }
}

/// Raw notification from the window-management backend.
///
/// These are already translated out of the display protocol but not yet
/// normalized: deduplication, monitor assignment and cache updates happen in
/// the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    WindowOpened(WindowHandle),
    WindowClosed(WindowHandle),
    WindowGeometryChanged(WindowHandle),
    WindowStateChanged(WindowHandle),
    WindowActionsChanged(WindowHandle),
    WindowNameChanged(WindowHandle),
    WindowIconChanged(WindowHandle),
    WindowWorkspaceChanged(WindowHandle),
    /// Pixel contents of a redirected window changed
    WindowDamaged(WindowHandle),
    StackingChanged,
    ActiveWindowChanged,
    WorkspaceAdded(u32),
    WorkspaceRemoved(u32),
    WorkspaceRenamed(u32),
    ActiveWorkspaceChanged,
    MonitorLayoutChanged,
    ScreenSizeChanged { width: u32, height: u32 },
}

/// Workspace attributes as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub number: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Monitor attributes as reported by the display backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    pub geometry: Geometry,
    pub primary: bool,
}

/// Decoded window icon (ARGB32 rows, largest size advertised)
#[derive(Debug, Clone)]
pub struct IconData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

/// Backend-side failure on a query or command
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("connection to the display server failed: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("window {0} is gone")]
    WindowGone(WindowHandle),
}

/// Recoverable failure while acquiring or manipulating window content.
///
/// Every variant is an expected transient condition; the content engine
/// reacts by suspending, never by propagating.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("window {0} is not viewable")]
    NotViewable(WindowHandle),

    #[error("compositing is unavailable: {0}")]
    Unavailable(&'static str),

    #[error("protocol error during resource batch: {0}")]
    Protocol(String),
}

/// Window-management side of the display server.
///
/// One implementation per display protocol, selected when the session is
/// assembled. All methods are synchronous; queries reflect the server state
/// at call time.
pub trait DesktopBackend {
    /// Managed windows in creation order
    fn windows(&self) -> Vec<WindowHandle>;
    /// Managed windows in bottom-to-top stacking order
    fn windows_stacked(&self) -> Vec<WindowHandle>;
    fn active_window(&self) -> Option<WindowHandle>;

    fn workspaces(&self) -> Vec<WorkspaceInfo>;
    fn active_workspace(&self) -> Option<u32>;

    fn monitors(&self) -> Vec<MonitorInfo>;
    /// Total desktop size spanning all monitors
    fn screen_size(&self) -> (u32, u32);

    /// Root-relative window geometry
    fn window_geometry(&self, window: WindowHandle) -> Result<Geometry, BackendError>;
    fn window_state(&self, window: WindowHandle) -> WindowStates;
    fn window_actions(&self, window: WindowHandle) -> WindowActions;
    fn window_name(&self, window: WindowHandle) -> String;
    fn window_workspace(&self, window: WindowHandle) -> Option<u32>;
    fn window_transient_for(&self, window: WindowHandle) -> Option<WindowHandle>;
    /// Resource class and instance from the window's class property
    fn window_class(&self, window: WindowHandle) -> (Option<String>, Option<String>);
    fn window_pid(&self, window: WindowHandle) -> Option<u32>;
    /// Per-window application id hint, when the toolkit sets one
    fn window_application_id(&self, window: WindowHandle) -> Option<String>;
    fn window_icon(&self, window: WindowHandle) -> Option<IconData>;

    /// Timestamp of the most recent user input, for activation requests
    fn last_input_time(&self) -> u32;

    fn show_window(&self, window: WindowHandle);
    fn hide_window(&self, window: WindowHandle);
    fn activate_window(&self, window: WindowHandle, timestamp: u32);
    fn close_window(&self, window: WindowHandle, timestamp: u32);
    fn move_resize_window(
        &self,
        window: WindowHandle,
        x: Option<i32>,
        y: Option<i32>,
        width: Option<u32>,
        height: Option<u32>,
    );
    /// Request a single semantic state bit on or off. The new state is not
    /// assumed; the cache updates when the state-changed echo arrives.
    fn request_state(&self, window: WindowHandle, state: WindowStates, enable: bool);
    fn set_window_workspace(&self, window: WindowHandle, workspace: u32);
}

/// Live compositing resources bound for one window
#[derive(Debug)]
pub struct WindowSurface {
    /// Off-screen pixmap naming the window's composited contents
    pub pixmap: u32,
    /// Drawable texture handle bound to the pixmap
    pub texture: Texture,
}

/// Opaque drawable texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub drawable: u32,
    pub width: u32,
    pub height: u32,
}

/// Compositing side of the display server: off-screen pixmaps, damage
/// notification objects and texture handles.
pub trait CompositeBackend {
    /// Redirect the window off-screen and bind a texture to its pixmap.
    ///
    /// The whole call is one trapped batch: any protocol error releases the
    /// partial resources and surfaces as a single `ContentError`.
    fn acquire_surface(&self, window: WindowHandle) -> Result<WindowSurface, ContentError>;
    fn release_surface(&self, window: WindowHandle, surface: WindowSurface);

    fn create_damage(&self, window: WindowHandle) -> Result<u32, ContentError>;
    fn release_damage(&self, damage: u32);

    /// Copy a texture into a private buffer that survives the source pixmap
    fn snapshot_texture(&self, texture: &Texture) -> Result<Texture, ContentError>;
    /// Upload decoded icon pixels as a static texture
    fn upload_icon(&self, icon: &IconData) -> Result<Texture, ContentError>;
    fn release_texture(&self, texture: Texture);
}

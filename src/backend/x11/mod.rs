//! X11 Backend Module
//!
//! Implements both backend traits over one X connection: the desktop side
//! watches EWMH properties on the root and on every managed window and
//! sends pager client messages; the compositing side binds named window
//! pixmaps to XRender pictures and tracks damage.

pub mod atoms;

use anyhow::{Context as _, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::{self, ConnectionExt as CompositeExt, Redirect};
use x11rb::protocol::damage::{self, ConnectionExt as DamageExt, ReportLevel};
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};
use x11rb::protocol::render::{self, ConnectionExt as RenderExt, CreatePictureAux, PictOp, PictType};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::backend::{
    BackendError, BackendEvent, CompositeBackend, ContentError, DesktopBackend, IconData,
    MonitorInfo, Texture, WindowHandle, WindowStates, WindowActions, WindowSurface, WorkspaceInfo,
};
use crate::shared::Geometry;
use atoms::Atoms;

/// Urgency flag inside the WM_HINTS flags word
const WM_HINTS_URGENCY: u32 = 1 << 8;

/// WM_STATE values (ICCCM)
const WM_STATE_ICONIC: u32 = 3;

/// Source indication for pager-originated client messages
const SOURCE_PAGER: u32 = 2;

/// Sticky-window desktop value
const ALL_WORKSPACES: u32 = 0xFFFF_FFFF;

/// X11 implementation of the desktop and compositing backends
pub struct X11Backend {
    conn: RustConnection,
    root: u32,
    atoms: Atoms,
    have_composite: bool,
    have_damage: bool,
    have_randr: bool,
    /// Last published client list, creation order
    known_windows: RefCell<Vec<WindowHandle>>,
    /// Last published workspace count and names, for add/remove/rename diffs
    workspace_count: Cell<u32>,
    workspace_names: RefCell<Vec<String>>,
    /// Pixmaps owned by snapshot/icon textures, keyed by picture id
    texture_pixmaps: RefCell<HashMap<u32, u32>>,
    /// Timestamp of the most recent event carrying one
    last_event_time: Cell<u32>,
}

impl X11Backend {
    /// Connect to the display and start watching the root window
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display)
            .map_err(|e| BackendError::Connection(e.to_string()))
            .context("Failed to connect to X server")?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        let atoms = Atoms::new(&conn)?;

        let have_composite = conn
            .extension_information(composite::X11_EXTENSION_NAME)?
            .is_some();
        if have_composite {
            let reply = conn.composite_query_version(0, 4)?.reply()?;
            debug!(
                "Composite extension {}.{} available",
                reply.major_version, reply.minor_version
            );
        } else {
            warn!("Composite extension not available, live window content disabled");
        }

        let have_damage = conn
            .extension_information(damage::X11_EXTENSION_NAME)?
            .is_some();
        if have_damage {
            let reply = conn.damage_query_version(1, 1)?.reply()?;
            debug!(
                "Damage extension {}.{} available",
                reply.major_version, reply.minor_version
            );
        } else {
            debug!("Damage extension not available, content stays until re-acquired");
        }

        let have_randr = conn
            .extension_information(randr::X11_EXTENSION_NAME)?
            .is_some();
        if have_randr {
            conn.randr_select_input(
                root,
                randr::NotifyMask::SCREEN_CHANGE
                    | randr::NotifyMask::CRTC_CHANGE
                    | randr::NotifyMask::OUTPUT_CHANGE,
            )?
            .check()
            .context("Failed to select RandR input on root window")?;
        }

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY),
        )?
        .check()
        .context("Failed to select events on root window")?;
        conn.flush()?;

        let backend = Self {
            conn,
            root,
            atoms,
            have_composite,
            have_damage,
            have_randr,
            known_windows: RefCell::new(Vec::new()),
            workspace_count: Cell::new(0),
            workspace_names: RefCell::new(Vec::new()),
            texture_pixmaps: RefCell::new(HashMap::new()),
            last_event_time: Cell::new(x11rb::CURRENT_TIME),
        };

        // Prime the diff state so the first translate pass reports only
        // genuine changes.
        let initial = backend.query_client_list();
        for &w in &initial {
            backend.watch_window(w);
        }
        *backend.known_windows.borrow_mut() = initial;
        let workspaces = backend.workspaces();
        backend.workspace_count.set(workspaces.len() as u32);
        *backend.workspace_names.borrow_mut() =
            workspaces.into_iter().map(|w| w.name).collect();

        Ok(backend)
    }

    /// Block for the next batch of backend events
    pub fn next_events(&self) -> Result<Vec<BackendEvent>> {
        let mut out = Vec::new();
        let event = self.conn.wait_for_event()?;
        self.translate(&event, &mut out);
        while let Some(event) = self.conn.poll_for_event()? {
            self.translate(&event, &mut out);
        }
        Ok(out)
    }

    /// Translate one X event into zero or more backend events
    pub fn translate(&self, event: &Event, out: &mut Vec<BackendEvent>) {
        if let Some(time) = event_timestamp(event) {
            self.last_event_time.set(time);
        }

        match event {
            Event::PropertyNotify(e) if e.window == self.root => {
                self.translate_root_property(e.atom, out);
            }
            Event::PropertyNotify(e) => {
                let w = WindowHandle(e.window);
                let a = e.atom;
                if a == self.atoms.net_wm_state || a == self.atoms.wm_state || a == self.atoms.wm_hints {
                    out.push(BackendEvent::WindowStateChanged(w));
                } else if a == self.atoms.net_wm_allowed_actions {
                    out.push(BackendEvent::WindowActionsChanged(w));
                } else if a == self.atoms.net_wm_name || a == self.atoms.wm_name {
                    out.push(BackendEvent::WindowNameChanged(w));
                } else if a == self.atoms.net_wm_icon {
                    out.push(BackendEvent::WindowIconChanged(w));
                } else if a == self.atoms.net_wm_desktop {
                    out.push(BackendEvent::WindowWorkspaceChanged(w));
                }
            }
            Event::ConfigureNotify(e) if e.window == self.root => {
                let (width, height) = self.screen_size();
                out.push(BackendEvent::ScreenSizeChanged { width, height });
            }
            Event::ConfigureNotify(e) => {
                if self.is_known(WindowHandle(e.window)) {
                    out.push(BackendEvent::WindowGeometryChanged(WindowHandle(e.window)));
                }
            }
            Event::MapNotify(e) => {
                if self.is_known(WindowHandle(e.window)) {
                    out.push(BackendEvent::WindowStateChanged(WindowHandle(e.window)));
                }
            }
            Event::UnmapNotify(e) => {
                if self.is_known(WindowHandle(e.window)) {
                    out.push(BackendEvent::WindowStateChanged(WindowHandle(e.window)));
                }
            }
            Event::DestroyNotify(_) => {
                // The client list property usually follows; diff now so a
                // lagging window manager cannot leave a stale entry behind.
                self.diff_client_list(out);
            }
            Event::DamageNotify(e) => {
                // Subtract so further damage keeps generating events
                let _ = self.conn.damage_subtract(e.damage, x11rb::NONE, x11rb::NONE);
                out.push(BackendEvent::WindowDamaged(WindowHandle(e.drawable)));
            }
            Event::RandrScreenChangeNotify(_) => {
                let (width, height) = self.screen_size();
                out.push(BackendEvent::ScreenSizeChanged { width, height });
                out.push(BackendEvent::MonitorLayoutChanged);
            }
            Event::RandrNotify(_) => {
                out.push(BackendEvent::MonitorLayoutChanged);
            }
            Event::Error(e) => {
                debug!(
                    "X11 error: code={}, request={}.{}",
                    e.error_code, e.major_opcode, e.minor_opcode
                );
            }
            _ => {}
        }
    }

    fn translate_root_property(&self, atom: Atom, out: &mut Vec<BackendEvent>) {
        if atom == self.atoms.net_client_list {
            self.diff_client_list(out);
        } else if atom == self.atoms.net_client_list_stacking {
            out.push(BackendEvent::StackingChanged);
        } else if atom == self.atoms.net_active_window {
            out.push(BackendEvent::ActiveWindowChanged);
        } else if atom == self.atoms.net_current_desktop {
            out.push(BackendEvent::ActiveWorkspaceChanged);
        } else if atom == self.atoms.net_number_of_desktops {
            let old = self.workspace_count.get();
            let new = self.query_workspace_count();
            for n in old..new {
                out.push(BackendEvent::WorkspaceAdded(n));
            }
            for n in (new..old).rev() {
                out.push(BackendEvent::WorkspaceRemoved(n));
            }
            self.workspace_count.set(new);
        } else if atom == self.atoms.net_desktop_names {
            let new = self.query_workspace_names();
            let mut names = self.workspace_names.borrow_mut();
            for (i, name) in new.iter().enumerate() {
                if names.get(i).map(|n| n != name).unwrap_or(true) {
                    out.push(BackendEvent::WorkspaceRenamed(i as u32));
                }
            }
            *names = new;
        } else if atom == self.atoms.net_desktop_geometry {
            let (width, height) = self.screen_size();
            out.push(BackendEvent::ScreenSizeChanged { width, height });
        }
    }

    /// Diff the root client list against the last published one
    fn diff_client_list(&self, out: &mut Vec<BackendEvent>) {
        let new = self.query_client_list();
        let mut known = self.known_windows.borrow_mut();

        for &w in known.iter() {
            if !new.contains(&w) {
                out.push(BackendEvent::WindowClosed(w));
            }
        }
        for &w in &new {
            if !known.contains(&w) {
                self.watch_window(w);
                out.push(BackendEvent::WindowOpened(w));
            }
        }
        *known = new;
    }

    fn is_known(&self, window: WindowHandle) -> bool {
        self.known_windows.borrow().contains(&window)
    }

    /// Select property and structure events on a managed window
    fn watch_window(&self, window: WindowHandle) {
        match self.conn.change_window_attributes(
            window.0,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY),
        ) {
            Ok(cookie) => cookie.ignore_error(),
            Err(_) => debug!("Window {} disappeared before it could be watched", window),
        }
        let _ = self.conn.flush();
    }

    fn query_client_list(&self) -> Vec<WindowHandle> {
        self.get_u32_list(self.root, self.atoms.net_client_list)
            .into_iter()
            .map(WindowHandle)
            .collect()
    }

    fn query_workspace_count(&self) -> u32 {
        self.get_u32(self.root, self.atoms.net_number_of_desktops)
            .unwrap_or(1)
    }

    fn query_workspace_names(&self) -> Vec<String> {
        let raw = self.get_bytes(self.root, self.atoms.net_desktop_names, self.atoms.utf8_string);
        raw.split(|&b| b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect()
    }

    // ------------------------------------------------------------------
    // Property helpers
    // ------------------------------------------------------------------

    fn get_u32(&self, window: u32, atom: Atom) -> Option<u32> {
        self.conn
            .get_property(false, window, atom, AtomEnum::ANY, 0, 1)
            .ok()?
            .reply()
            .ok()?
            .value32()?
            .next()
    }

    fn get_u32_list(&self, window: u32, atom: Atom) -> Vec<u32> {
        let reply = match self
            .conn
            .get_property(false, window, atom, AtomEnum::ANY, 0, u32::MAX)
            .ok()
            .and_then(|c| c.reply().ok())
        {
            Some(reply) => reply,
            None => return Vec::new(),
        };
        reply.value32().map(|v| v.collect()).unwrap_or_default()
    }

    fn get_bytes(&self, window: u32, atom: Atom, type_: Atom) -> Vec<u8> {
        self.conn
            .get_property(false, window, atom, type_, 0, u32::MAX)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|r| r.value)
            .unwrap_or_default()
    }

    fn get_string(&self, window: u32, atom: Atom, type_: Atom) -> Option<String> {
        let bytes = self.get_bytes(window, atom, type_);
        if bytes.is_empty() {
            return None;
        }
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Send an EWMH client message to the root window on a window's behalf
    fn send_root_message(&self, window: u32, type_: Atom, data: [u32; 5]) {
        let event = ClientMessageEvent::new(32, window, type_, data);
        let result = self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        );
        if let Err(e) = result {
            warn!("Failed to send client message for window 0x{:x}: {:?}", window, e);
        }
        let _ = self.conn.flush();
    }

    fn send_wm_state_message(&self, window: WindowHandle, atom1: Atom, atom2: Atom, enable: bool) {
        let action = if enable { 1 } else { 0 };
        self.send_root_message(
            window.0,
            self.atoms.net_wm_state,
            [action, atom1, atom2, SOURCE_PAGER, 0],
        );
    }

    /// Toggle the urgency bit in WM_HINTS. Urgency has no EWMH message; it
    /// is a client-side protocol hint.
    fn set_urgency_hint(&self, window: WindowHandle, urgent: bool) {
        let mut hints = self.get_u32_list(window.0, AtomEnum::WM_HINTS.into());
        if hints.is_empty() {
            hints = vec![0; 9];
        }
        if urgent {
            hints[0] |= WM_HINTS_URGENCY;
        } else {
            hints[0] &= !WM_HINTS_URGENCY;
        }
        let _ = self.conn.change_property32(
            PropMode::REPLACE,
            window.0,
            AtomEnum::WM_HINTS,
            AtomEnum::WM_HINTS,
            &hints,
        );
        let _ = self.conn.flush();
    }

    /// Find the XRender picture format for a given pixmap depth
    fn pict_format_for_depth(&self, depth: u8) -> Result<render::Pictformat, ContentError> {
        let formats = self
            .conn
            .render_query_pict_formats()
            .map_err(|e| ContentError::Protocol(e.to_string()))?
            .reply()
            .map_err(|e| ContentError::Protocol(e.to_string()))?;
        formats
            .formats
            .iter()
            .find(|f| f.type_ == PictType::DIRECT && f.depth == depth)
            .map(|f| f.id)
            .ok_or(ContentError::Unavailable("no picture format for depth"))
    }

    /// Window must be viewable with non-zero size before its pixmap can be
    /// named.
    fn is_window_ready(&self, window: WindowHandle) -> bool {
        let viewable = self
            .conn
            .get_window_attributes(window.0)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|attrs| attrs.map_state == MapState::VIEWABLE)
            .unwrap_or(false);
        if !viewable {
            return false;
        }
        self.conn
            .get_geometry(window.0)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|geom| geom.width > 0 && geom.height > 0)
            .unwrap_or(false)
    }
}

/// Timestamp carried by an event, if any
fn event_timestamp(event: &Event) -> Option<u32> {
    match event {
        Event::ButtonPress(e) => Some(e.time),
        Event::ButtonRelease(e) => Some(e.time),
        Event::KeyPress(e) => Some(e.time),
        Event::KeyRelease(e) => Some(e.time),
        Event::MotionNotify(e) => Some(e.time),
        Event::EnterNotify(e) => Some(e.time),
        Event::LeaveNotify(e) => Some(e.time),
        Event::PropertyNotify(e) => Some(e.time),
        _ => None,
    }
}

impl DesktopBackend for X11Backend {
    fn windows(&self) -> Vec<WindowHandle> {
        self.known_windows.borrow().clone()
    }

    fn windows_stacked(&self) -> Vec<WindowHandle> {
        self.get_u32_list(self.root, self.atoms.net_client_list_stacking)
            .into_iter()
            .map(WindowHandle)
            .collect()
    }

    fn active_window(&self) -> Option<WindowHandle> {
        match self.get_u32(self.root, self.atoms.net_active_window) {
            Some(0) | None => None,
            Some(w) => Some(WindowHandle(w)),
        }
    }

    fn workspaces(&self) -> Vec<WorkspaceInfo> {
        let count = self.query_workspace_count();
        let names = self.query_workspace_names();
        let geometry = self.get_u32_list(self.root, self.atoms.net_desktop_geometry);
        let (screen_w, screen_h) = self.screen_size();
        let width = geometry.first().copied().unwrap_or(screen_w);
        let height = geometry.get(1).copied().unwrap_or(screen_h);

        (0..count)
            .map(|n| WorkspaceInfo {
                number: n,
                name: names
                    .get(n as usize)
                    .cloned()
                    .unwrap_or_else(|| format!("Workspace {}", n + 1)),
                width,
                height,
            })
            .collect()
    }

    fn active_workspace(&self) -> Option<u32> {
        self.get_u32(self.root, self.atoms.net_current_desktop)
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        if self.have_randr {
            let reply = self
                .conn
                .randr_get_monitors(self.root, true)
                .ok()
                .and_then(|c| c.reply().ok());
            if let Some(reply) = reply {
                let monitors: Vec<MonitorInfo> = reply
                    .monitors
                    .iter()
                    .map(|m| MonitorInfo {
                        geometry: Geometry::new(
                            m.x as i32,
                            m.y as i32,
                            m.width as u32,
                            m.height as u32,
                        ),
                        primary: m.primary,
                    })
                    .collect();
                if !monitors.is_empty() {
                    return monitors;
                }
            }
        }
        // Single-monitor fallback spanning the whole screen
        let (width, height) = self.screen_size();
        vec![MonitorInfo {
            geometry: Geometry::new(0, 0, width, height),
            primary: true,
        }]
    }

    fn screen_size(&self) -> (u32, u32) {
        self.conn
            .get_geometry(self.root)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|g| (g.width as u32, g.height as u32))
            .unwrap_or((0, 0))
    }

    fn window_geometry(&self, window: WindowHandle) -> Result<Geometry, BackendError> {
        let geom = self
            .conn
            .get_geometry(window.0)
            .map_err(|e| BackendError::Protocol(e.to_string()))?
            .reply()
            .map_err(|_| BackendError::WindowGone(window))?;
        // Reparenting window managers leave get_geometry frame-relative;
        // translate to root coordinates.
        let translated = self
            .conn
            .translate_coordinates(window.0, self.root, 0, 0)
            .map_err(|e| BackendError::Protocol(e.to_string()))?
            .reply()
            .map_err(|_| BackendError::WindowGone(window))?;
        Ok(Geometry::new(
            translated.dst_x as i32,
            translated.dst_y as i32,
            geom.width as u32,
            geom.height as u32,
        ))
    }

    fn window_state(&self, window: WindowHandle) -> WindowStates {
        let mut state = WindowStates::empty();
        let atoms = self.get_u32_list(window.0, self.atoms.net_wm_state);
        for &atom in &atoms {
            if atom == self.atoms.net_wm_state_hidden {
                state |= WindowStates::MINIMIZED;
            } else if atom == self.atoms.net_wm_state_fullscreen {
                state |= WindowStates::FULLSCREEN;
            } else if atom == self.atoms.net_wm_state_skip_pager {
                state |= WindowStates::SKIP_PAGER;
            } else if atom == self.atoms.net_wm_state_skip_taskbar {
                state |= WindowStates::SKIP_TASKLIST;
            } else if atom == self.atoms.net_wm_state_sticky {
                state |= WindowStates::PINNED;
            } else if atom == self.atoms.net_wm_state_demands_attention {
                state |= WindowStates::URGENT;
            }
        }
        // Maximized only when both directions are set
        if atoms.contains(&self.atoms.net_wm_state_maximized_vert)
            && atoms.contains(&self.atoms.net_wm_state_maximized_horz)
        {
            state |= WindowStates::MAXIMIZED;
        }
        // ICCCM iconic state counts as minimized even without the EWMH bit
        if let Some(wm_state) = self.get_u32(window.0, self.atoms.wm_state) {
            if wm_state == WM_STATE_ICONIC {
                state |= WindowStates::MINIMIZED;
            }
        }
        // Urgency may come through WM_HINTS instead of the EWMH state
        if let Some(&flags) = self.get_u32_list(window.0, AtomEnum::WM_HINTS.into()).first() {
            if flags & WM_HINTS_URGENCY != 0 {
                state |= WindowStates::URGENT;
            }
        }
        // "Hidden" means the overlay should not present the window
        if state.contains(WindowStates::MINIMIZED) || state.contains(WindowStates::SKIP_TASKLIST) {
            state |= WindowStates::HIDDEN;
        }
        // Pinned also shows as the sticky desktop value
        if self.get_u32(window.0, self.atoms.net_wm_desktop) == Some(ALL_WORKSPACES) {
            state |= WindowStates::PINNED;
        }
        state
    }

    fn window_actions(&self, window: WindowHandle) -> WindowActions {
        let atoms = self.get_u32_list(window.0, self.atoms.net_wm_allowed_actions);
        if atoms.is_empty() {
            // Property missing: assume everything is allowed
            return WindowActions::all();
        }
        let mut actions = WindowActions::empty();
        for atom in atoms {
            if atom == self.atoms.net_wm_action_close {
                actions |= WindowActions::CLOSE;
            } else if atom == self.atoms.net_wm_action_minimize {
                actions |= WindowActions::MINIMIZE;
            } else if atom == self.atoms.net_wm_action_maximize_horz
                || atom == self.atoms.net_wm_action_maximize_vert
            {
                actions |= WindowActions::MAXIMIZE;
            } else if atom == self.atoms.net_wm_action_fullscreen {
                actions |= WindowActions::FULLSCREEN;
            } else if atom == self.atoms.net_wm_action_move {
                actions |= WindowActions::MOVE;
            } else if atom == self.atoms.net_wm_action_resize {
                actions |= WindowActions::RESIZE;
            } else if atom == self.atoms.net_wm_action_change_desktop {
                actions |= WindowActions::CHANGE_WORKSPACE;
            } else if atom == self.atoms.net_wm_action_stick {
                actions |= WindowActions::STICK;
            }
        }
        actions
    }

    fn window_name(&self, window: WindowHandle) -> String {
        self.get_string(window.0, self.atoms.net_wm_name, self.atoms.utf8_string)
            .or_else(|| self.get_string(window.0, AtomEnum::WM_NAME.into(), AtomEnum::ANY.into()))
            .unwrap_or_default()
    }

    fn window_workspace(&self, window: WindowHandle) -> Option<u32> {
        match self.get_u32(window.0, self.atoms.net_wm_desktop) {
            Some(ALL_WORKSPACES) | None => None,
            Some(n) => Some(n),
        }
    }

    fn window_transient_for(&self, window: WindowHandle) -> Option<WindowHandle> {
        match self.get_u32(window.0, AtomEnum::WM_TRANSIENT_FOR.into()) {
            Some(0) | None => None,
            Some(w) => Some(WindowHandle(w)),
        }
    }

    fn window_class(&self, window: WindowHandle) -> (Option<String>, Option<String>) {
        let raw = self.get_bytes(window.0, AtomEnum::WM_CLASS.into(), AtomEnum::ANY.into());
        if raw.is_empty() {
            return (None, None);
        }
        // WM_CLASS format: "instance\0class\0"
        let mut parts = raw.split(|&b| b == 0);
        let instance = parts
            .next()
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned());
        let class = parts
            .next()
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned());
        (class, instance)
    }

    fn window_pid(&self, window: WindowHandle) -> Option<u32> {
        self.get_u32(window.0, self.atoms.net_wm_pid)
    }

    fn window_application_id(&self, window: WindowHandle) -> Option<String> {
        self.get_string(window.0, self.atoms.gtk_application_id, self.atoms.utf8_string)
    }

    fn window_icon(&self, window: WindowHandle) -> Option<IconData> {
        let data = self.get_u32_list(window.0, self.atoms.net_wm_icon);
        // _NET_WM_ICON: repeated (width, height, pixels...) entries; pick
        // the largest sane one.
        let mut best: Option<IconData> = None;
        let mut rest = &data[..];
        while rest.len() >= 2 {
            let width = rest[0] as usize;
            let height = rest[1] as usize;
            let pixel_count = match width.checked_mul(height) {
                Some(n) if n > 0 && n <= 1024 * 1024 && rest.len() >= 2 + n => n,
                _ => break,
            };
            let candidate = IconData {
                width: width as u32,
                height: height as u32,
                pixels: rest[2..2 + pixel_count].to_vec(),
            };
            if best
                .as_ref()
                .map(|b| candidate.width * candidate.height > b.width * b.height)
                .unwrap_or(true)
            {
                best = Some(candidate);
            }
            rest = &rest[2 + pixel_count..];
        }
        best
    }

    fn last_input_time(&self) -> u32 {
        self.last_event_time.get()
    }

    fn show_window(&self, window: WindowHandle) {
        // ICCCM: mapping an iconified window requests NormalState
        let _ = self.conn.map_window(window.0);
        let _ = self.conn.flush();
    }

    fn hide_window(&self, window: WindowHandle) {
        self.send_root_message(
            window.0,
            self.atoms.wm_change_state,
            [WM_STATE_ICONIC, 0, 0, 0, 0],
        );
    }

    fn activate_window(&self, window: WindowHandle, timestamp: u32) {
        self.send_root_message(
            window.0,
            self.atoms.net_active_window,
            [SOURCE_PAGER, timestamp, 0, 0, 0],
        );
    }

    fn close_window(&self, window: WindowHandle, timestamp: u32) {
        self.send_root_message(
            window.0,
            self.atoms.net_close_window,
            [timestamp, SOURCE_PAGER, 0, 0, 0],
        );
    }

    fn move_resize_window(
        &self,
        window: WindowHandle,
        x: Option<i32>,
        y: Option<i32>,
        width: Option<u32>,
        height: Option<u32>,
    ) {
        let mut flags: u32 = SOURCE_PAGER << 12;
        if x.is_some() {
            flags |= 1 << 8;
        }
        if y.is_some() {
            flags |= 1 << 9;
        }
        if width.is_some() {
            flags |= 1 << 10;
        }
        if height.is_some() {
            flags |= 1 << 11;
        }
        self.send_root_message(
            window.0,
            self.atoms.net_moveresize_window,
            [
                flags,
                x.unwrap_or(0) as u32,
                y.unwrap_or(0) as u32,
                width.unwrap_or(0),
                height.unwrap_or(0),
            ],
        );
    }

    fn request_state(&self, window: WindowHandle, state: WindowStates, enable: bool) {
        if state == WindowStates::MAXIMIZED {
            self.send_wm_state_message(
                window,
                self.atoms.net_wm_state_maximized_vert,
                self.atoms.net_wm_state_maximized_horz,
                enable,
            );
        } else if state == WindowStates::FULLSCREEN {
            self.send_wm_state_message(window, self.atoms.net_wm_state_fullscreen, 0, enable);
        } else if state == WindowStates::SKIP_PAGER {
            self.send_wm_state_message(window, self.atoms.net_wm_state_skip_pager, 0, enable);
        } else if state == WindowStates::SKIP_TASKLIST {
            self.send_wm_state_message(window, self.atoms.net_wm_state_skip_taskbar, 0, enable);
        } else if state == WindowStates::PINNED {
            self.send_wm_state_message(window, self.atoms.net_wm_state_sticky, 0, enable);
        } else if state == WindowStates::URGENT {
            self.set_urgency_hint(window, enable);
        } else if state == WindowStates::MINIMIZED {
            if enable {
                self.hide_window(window);
            } else {
                self.show_window(window);
            }
        } else {
            debug!("No backend translation for state bits {:?}", state);
        }
    }

    fn set_window_workspace(&self, window: WindowHandle, workspace: u32) {
        self.send_root_message(
            window.0,
            self.atoms.net_wm_desktop,
            [workspace, SOURCE_PAGER, 0, 0, 0],
        );
    }
}

impl CompositeBackend for X11Backend {
    fn acquire_surface(&self, window: WindowHandle) -> Result<WindowSurface, ContentError> {
        if !self.have_composite {
            return Err(ContentError::Unavailable("composite extension missing"));
        }
        if !self.is_window_ready(window) {
            return Err(ContentError::NotViewable(window));
        }

        // Trapped batch: every request is checked, any error unwinds the
        // partial resources and fails the acquisition as a whole.
        let trap = |e: &dyn std::fmt::Display| ContentError::Protocol(e.to_string());

        self.conn
            .composite_redirect_window(window.0, Redirect::AUTOMATIC)
            .map_err(|e| trap(&e))?
            .check()
            .map_err(|e| trap(&e))?;

        let pixmap = match self.conn.generate_id() {
            Ok(id) => id,
            Err(e) => {
                let _ = self.conn.composite_unredirect_window(window.0, Redirect::AUTOMATIC);
                return Err(trap(&e));
            }
        };

        let named = self
            .conn
            .composite_name_window_pixmap(window.0, pixmap)
            .map_err(|e| trap(&e))
            .and_then(|c| c.check().map_err(|e| trap(&e)));
        if let Err(e) = named {
            let _ = self.conn.composite_unredirect_window(window.0, Redirect::AUTOMATIC);
            return Err(e);
        }

        let geom = self
            .conn
            .get_geometry(window.0)
            .map_err(|e| trap(&e))
            .and_then(|c| c.reply().map_err(|e| trap(&e)));
        let geom = match geom {
            Ok(geom) => geom,
            Err(e) => {
                let _ = self.conn.free_pixmap(pixmap);
                let _ = self.conn.composite_unredirect_window(window.0, Redirect::AUTOMATIC);
                return Err(e);
            }
        };

        let bound = self.pict_format_for_depth(geom.depth).and_then(|format| {
            let picture = self.conn.generate_id().map_err(|e| trap(&e))?;
            self.conn
                .render_create_picture(picture, pixmap, format, &CreatePictureAux::new())
                .map_err(|e| trap(&e))?
                .check()
                .map_err(|e| trap(&e))?;
            Ok(picture)
        });
        let picture = match bound {
            Ok(picture) => picture,
            Err(e) => {
                let _ = self.conn.free_pixmap(pixmap);
                let _ = self.conn.composite_unredirect_window(window.0, Redirect::AUTOMATIC);
                return Err(e);
            }
        };

        debug!(
            "Bound surface for window {}: pixmap {} ({}x{}, depth {})",
            window, pixmap, geom.width, geom.height, geom.depth
        );

        Ok(WindowSurface {
            pixmap,
            texture: Texture {
                drawable: picture,
                width: geom.width as u32,
                height: geom.height as u32,
            },
        })
    }

    fn release_surface(&self, window: WindowHandle, surface: WindowSurface) {
        // The window may already be gone; releases are best-effort.
        let _ = self.conn.render_free_picture(surface.texture.drawable);
        let _ = self.conn.free_pixmap(surface.pixmap);
        let _ = self
            .conn
            .composite_unredirect_window(window.0, Redirect::AUTOMATIC);
        let _ = self.conn.flush();
    }

    fn create_damage(&self, window: WindowHandle) -> Result<u32, ContentError> {
        if !self.have_damage {
            return Err(ContentError::Unavailable("damage extension missing"));
        }
        let trap = |e: &dyn std::fmt::Display| ContentError::Protocol(e.to_string());
        let damage = self.conn.generate_id().map_err(|e| trap(&e))?;
        self.conn
            .damage_create(damage, window.0, ReportLevel::NON_EMPTY)
            .map_err(|e| trap(&e))?
            .check()
            .map_err(|e| trap(&e))?;
        debug!("Tracking damage for window {}", window);
        Ok(damage)
    }

    fn release_damage(&self, damage: u32) {
        let _ = self.conn.damage_destroy(damage);
        let _ = self.conn.flush();
    }

    fn snapshot_texture(&self, texture: &Texture) -> Result<Texture, ContentError> {
        let trap = |e: &dyn std::fmt::Display| ContentError::Protocol(e.to_string());
        let format = self.pict_format_for_depth(32)?;

        let pixmap = self.conn.generate_id().map_err(|e| trap(&e))?;
        self.conn
            .create_pixmap(32, pixmap, self.root, texture.width as u16, texture.height as u16)
            .map_err(|e| trap(&e))?
            .check()
            .map_err(|e| trap(&e))?;

        let picture = self.conn.generate_id().map_err(|e| trap(&e))?;
        let created = self
            .conn
            .render_create_picture(picture, pixmap, format, &CreatePictureAux::new())
            .map_err(|e| trap(&e))
            .and_then(|c| c.check().map_err(|e| trap(&e)))
            .and_then(|_| {
                self.conn
                    .render_composite(
                        PictOp::SRC,
                        texture.drawable,
                        x11rb::NONE,
                        picture,
                        0,
                        0,
                        0,
                        0,
                        0,
                        0,
                        texture.width as u16,
                        texture.height as u16,
                    )
                    .map_err(|e| trap(&e))?
                    .check()
                    .map_err(|e| trap(&e))
            });
        if let Err(e) = created {
            let _ = self.conn.render_free_picture(picture);
            let _ = self.conn.free_pixmap(pixmap);
            return Err(e);
        }

        self.texture_pixmaps.borrow_mut().insert(picture, pixmap);
        Ok(Texture {
            drawable: picture,
            width: texture.width,
            height: texture.height,
        })
    }

    fn upload_icon(&self, icon: &IconData) -> Result<Texture, ContentError> {
        let trap = |e: &dyn std::fmt::Display| ContentError::Protocol(e.to_string());
        let format = self.pict_format_for_depth(32)?;

        let pixmap = self.conn.generate_id().map_err(|e| trap(&e))?;
        self.conn
            .create_pixmap(32, pixmap, self.root, icon.width as u16, icon.height as u16)
            .map_err(|e| trap(&e))?
            .check()
            .map_err(|e| trap(&e))?;

        let gc = self.conn.generate_id().map_err(|e| trap(&e))?;
        let mut bytes = Vec::with_capacity(icon.pixels.len() * 4);
        for pixel in &icon.pixels {
            bytes.extend_from_slice(&pixel.to_ne_bytes());
        }

        let uploaded = self
            .conn
            .create_gc(gc, pixmap, &CreateGCAux::new())
            .map_err(|e| trap(&e))
            .and_then(|c| c.check().map_err(|e| trap(&e)))
            .and_then(|_| {
                self.conn
                    .put_image(
                        ImageFormat::Z_PIXMAP,
                        pixmap,
                        gc,
                        icon.width as u16,
                        icon.height as u16,
                        0,
                        0,
                        0,
                        32,
                        &bytes,
                    )
                    .map_err(|e| trap(&e))?
                    .check()
                    .map_err(|e| trap(&e))
            });
        let _ = self.conn.free_gc(gc);
        if let Err(e) = uploaded {
            let _ = self.conn.free_pixmap(pixmap);
            return Err(e);
        }

        let picture = self.conn.generate_id().map_err(|e| trap(&e))?;
        let created = self
            .conn
            .render_create_picture(picture, pixmap, format, &CreatePictureAux::new())
            .map_err(|e| trap(&e))
            .and_then(|c| c.check().map_err(|e| trap(&e)));
        if let Err(e) = created {
            let _ = self.conn.free_pixmap(pixmap);
            return Err(e);
        }

        self.texture_pixmaps.borrow_mut().insert(picture, pixmap);
        Ok(Texture {
            drawable: picture,
            width: icon.width,
            height: icon.height,
        })
    }

    fn release_texture(&self, texture: Texture) {
        let _ = self.conn.render_free_picture(texture.drawable);
        if let Some(pixmap) = self.texture_pixmaps.borrow_mut().remove(&texture.drawable) {
            let _ = self.conn.free_pixmap(pixmap);
        }
        let _ = self.conn.flush();
    }
}

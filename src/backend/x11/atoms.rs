//! Interned atoms for the EWMH/ICCCM properties the tracker watches
//! and the client messages it sends as a pager.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt};

/// Holds all interned atoms
#[derive(Debug)]
pub struct Atoms {
    // Root window properties
    pub net_client_list: Atom,
    pub net_client_list_stacking: Atom,
    pub net_active_window: Atom,
    pub net_number_of_desktops: Atom,
    pub net_current_desktop: Atom,
    pub net_desktop_names: Atom,
    pub net_desktop_geometry: Atom,
    // Per-window properties
    pub net_wm_name: Atom,
    pub net_wm_desktop: Atom,
    pub net_wm_pid: Atom,
    pub net_wm_icon: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_wm_state_maximized_vert: Atom,
    pub net_wm_state_maximized_horz: Atom,
    pub net_wm_state_fullscreen: Atom,
    pub net_wm_state_skip_pager: Atom,
    pub net_wm_state_skip_taskbar: Atom,
    pub net_wm_state_sticky: Atom,
    pub net_wm_state_demands_attention: Atom,
    pub net_wm_allowed_actions: Atom,
    pub net_wm_action_close: Atom,
    pub net_wm_action_minimize: Atom,
    pub net_wm_action_maximize_horz: Atom,
    pub net_wm_action_maximize_vert: Atom,
    pub net_wm_action_fullscreen: Atom,
    pub net_wm_action_move: Atom,
    pub net_wm_action_resize: Atom,
    pub net_wm_action_change_desktop: Atom,
    pub net_wm_action_stick: Atom,
    // Pager client messages
    pub net_close_window: Atom,
    pub net_moveresize_window: Atom,
    // Application association hints
    pub gtk_application_id: Atom,
    // Standard X11 atoms
    pub wm_state: Atom,
    pub wm_change_state: Atom,
    pub wm_hints: Atom,
    pub wm_name: Atom,
    pub utf8_string: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        // Helper to intern a single atom
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            net_client_list: intern("_NET_CLIENT_LIST")?,
            net_client_list_stacking: intern("_NET_CLIENT_LIST_STACKING")?,
            net_active_window: intern("_NET_ACTIVE_WINDOW")?,
            net_number_of_desktops: intern("_NET_NUMBER_OF_DESKTOPS")?,
            net_current_desktop: intern("_NET_CURRENT_DESKTOP")?,
            net_desktop_names: intern("_NET_DESKTOP_NAMES")?,
            net_desktop_geometry: intern("_NET_DESKTOP_GEOMETRY")?,
            net_wm_name: intern("_NET_WM_NAME")?,
            net_wm_desktop: intern("_NET_WM_DESKTOP")?,
            net_wm_pid: intern("_NET_WM_PID")?,
            net_wm_icon: intern("_NET_WM_ICON")?,
            net_wm_state: intern("_NET_WM_STATE")?,
            net_wm_state_hidden: intern("_NET_WM_STATE_HIDDEN")?,
            net_wm_state_maximized_vert: intern("_NET_WM_STATE_MAXIMIZED_VERT")?,
            net_wm_state_maximized_horz: intern("_NET_WM_STATE_MAXIMIZED_HORZ")?,
            net_wm_state_fullscreen: intern("_NET_WM_STATE_FULLSCREEN")?,
            net_wm_state_skip_pager: intern("_NET_WM_STATE_SKIP_PAGER")?,
            net_wm_state_skip_taskbar: intern("_NET_WM_STATE_SKIP_TASKBAR")?,
            net_wm_state_sticky: intern("_NET_WM_STATE_STICKY")?,
            net_wm_state_demands_attention: intern("_NET_WM_STATE_DEMANDS_ATTENTION")?,
            net_wm_allowed_actions: intern("_NET_WM_ALLOWED_ACTIONS")?,
            net_wm_action_close: intern("_NET_WM_ACTION_CLOSE")?,
            net_wm_action_minimize: intern("_NET_WM_ACTION_MINIMIZE")?,
            net_wm_action_maximize_horz: intern("_NET_WM_ACTION_MAXIMIZE_HORZ")?,
            net_wm_action_maximize_vert: intern("_NET_WM_ACTION_MAXIMIZE_VERT")?,
            net_wm_action_fullscreen: intern("_NET_WM_ACTION_FULLSCREEN")?,
            net_wm_action_move: intern("_NET_WM_ACTION_MOVE")?,
            net_wm_action_resize: intern("_NET_WM_ACTION_RESIZE")?,
            net_wm_action_change_desktop: intern("_NET_WM_ACTION_CHANGE_DESKTOP")?,
            net_wm_action_stick: intern("_NET_WM_ACTION_STICK")?,
            net_close_window: intern("_NET_CLOSE_WINDOW")?,
            net_moveresize_window: intern("_NET_MOVERESIZE_WINDOW")?,
            gtk_application_id: intern("_GTK_APPLICATION_ID")?,
            wm_state: intern("WM_STATE")?,
            wm_change_state: intern("WM_CHANGE_STATE")?,
            wm_hints: intern("WM_HINTS")?,
            wm_name: intern("WM_NAME")?,
            utf8_string: intern("UTF8_STRING")?,
        })
    }
}

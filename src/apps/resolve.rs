//! Window-to-application resolution.
//!
//! Given only a window, identify which installed application spawned it.
//! The stages run in strict precedence and stop at the first match; failing
//! every stage is "no association", not an error.

use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

use crate::apps::{AppEntry, AppIndex};
use crate::tracker::window::Window;

/// The association hints a window can offer, extracted up front so the
/// precedence chain itself is pure
#[derive(Debug, Default, Clone)]
pub struct WindowHints {
    /// Toolkit-set application id property
    pub application_id: Option<String>,
    /// Resource class (group) name
    pub class_group: Option<String>,
    /// Resource instance name
    pub class_instance: Option<String>,
    /// On-disk executable of the owning process
    pub executable: Option<PathBuf>,
}

impl WindowHints {
    pub fn for_window(window: &Window) -> Self {
        Self {
            application_id: window.application_id(),
            class_group: window.class_group(),
            class_instance: window.class_instance(),
            executable: window.pid().and_then(executable_for_pid),
        }
    }
}

pub fn resolve_window_application(window: &Window, index: &AppIndex) -> Option<Rc<AppEntry>> {
    let hints = WindowHints::for_window(window);
    let resolved = resolve_application(&hints, index);
    match &resolved {
        Some(app) => debug!("Window {} resolved to application '{}'", window.handle(), app.id),
        None => debug!("Window {} has no application association", window.handle()),
    }
    resolved
}

/// The precedence chain
pub fn resolve_application(hints: &WindowHints, index: &AppIndex) -> Option<Rc<AppEntry>> {
    // 1. Application id hint, exact then case-insensitive
    if let Some(id) = hints.application_id.as_deref() {
        if let Some(app) = index.lookup_id(id) {
            return Some(app);
        }
        // 2. The id may be installed under a subdirectory prefix
        if let Some(app) = index.lookup_prefixed_id(id) {
            return Some(app);
        }
    }

    // 3. Declared startup class against the window class, group then instance
    if let Some(group) = hints.class_group.as_deref() {
        if let Some(app) = index.lookup_startup_class(group) {
            return Some(app);
        }
    }
    if let Some(instance) = hints.class_instance.as_deref() {
        if let Some(app) = index.lookup_startup_class(instance) {
            return Some(app);
        }
    }

    // 4. Window class names as desktop-file ids, group then instance
    if let Some(group) = hints.class_group.as_deref() {
        if let Some(app) = index.lookup_id(group) {
            return Some(app);
        }
    }
    if let Some(instance) = hints.class_instance.as_deref() {
        if let Some(app) = index.lookup_id(instance) {
            return Some(app);
        }
    }

    // 5. Owning process executable
    if let Some(exe) = hints.executable.as_deref() {
        if let Some(app) = index.lookup_executable(exe) {
            return Some(app);
        }
    }

    // 6. No association
    None
}

/// Resolve a process id to its on-disk executable via the process table
fn executable_for_pid(pid: u32) -> Option<PathBuf> {
    std::fs::read_link(format!("/proc/{}/exe", pid)).ok()
}

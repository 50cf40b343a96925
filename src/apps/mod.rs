//! Apps Module
//!
//! Index of installed applications built from `.desktop` entries, used to
//! associate tracked windows with the application that spawned them.

pub mod resolve;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use freedesktop_desktop_entry::{default_paths, DesktopEntry, Iter};
use tracing::{debug, info};

/// One installed application
#[derive(Debug, Clone)]
pub struct AppEntry {
    /// Desktop-file id, without the `.desktop` suffix
    pub id: String,
    pub name: String,
    /// Executable from TryExec/Exec with field codes stripped
    pub exec_path: Option<PathBuf>,
    /// Declared startup window-manager class, when present
    pub startup_wm_class: Option<String>,
    pub icon: Option<String>,
}

/// Installed-application index
pub struct AppIndex {
    entries: Vec<Rc<AppEntry>>,
}

impl AppIndex {
    /// Scan the XDG application directories
    pub fn load() -> Self {
        let mut entries = Vec::new();
        for path in Iter::new(default_paths()) {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(_) => continue,
            };
            let entry = match DesktopEntry::from_str(&path, &content, &[] as &[&str]) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unparsable desktop entry {:?}: {}", path, e);
                    continue;
                }
            };
            if entry.no_display() {
                continue;
            }
            if entry.desktop_entry("Hidden") == Some("true") {
                continue;
            }
            let exec = entry
                .desktop_entry("TryExec")
                .or_else(|| entry.exec())
                .and_then(strip_exec_field_codes);
            entries.push(Rc::new(AppEntry {
                id: entry.appid.to_string(),
                name: entry
                    .name(&[] as &[&str])
                    .map(|n| n.into_owned())
                    .unwrap_or_else(|| entry.appid.to_string()),
                exec_path: exec,
                startup_wm_class: entry.startup_wm_class().map(str::to_string),
                icon: entry.icon().map(str::to_string),
            }));
        }
        info!("Indexed {} installed applications", entries.len());
        Self { entries }
    }

    /// Build an index from prepared entries
    pub fn from_entries(entries: Vec<AppEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Rc::new).collect(),
        }
    }

    pub fn entries(&self) -> &[Rc<AppEntry>] {
        &self.entries
    }

    /// Exact id lookup, falling back to a case-insensitive pass
    pub fn lookup_id(&self, id: &str) -> Option<Rc<AppEntry>> {
        if let Some(entry) = self.entries.iter().find(|e| e.id == id) {
            return Some(Rc::clone(entry));
        }
        let lower = id.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.id.to_lowercase() == lower)
            .cloned()
    }

    /// Match ids nested under a subdirectory prefix (`<prefix>-<id>.desktop`).
    /// Ambiguity counts as not found: the match is only accepted when exactly
    /// one candidate ends with the suffix.
    pub fn lookup_prefixed_id(&self, id: &str) -> Option<Rc<AppEntry>> {
        let suffix = format!("-{}", id.to_lowercase());
        let mut candidates = self
            .entries
            .iter()
            .filter(|e| e.id.to_lowercase().ends_with(&suffix));
        let first = candidates.next()?;
        if candidates.next().is_some() {
            debug!("Ambiguous prefixed-id match for '{}', treating as not found", id);
            return None;
        }
        Some(Rc::clone(first))
    }

    /// Match a window class name against declared startup classes
    pub fn lookup_startup_class(&self, class: &str) -> Option<Rc<AppEntry>> {
        self.entries
            .iter()
            .find(|e| e.startup_wm_class.as_deref() == Some(class))
            .cloned()
    }

    /// Match a process executable against application executables.
    /// Absolute-vs-absolute compares full paths; a relative path on either
    /// side compares basenames only.
    pub fn lookup_executable(&self, exe: &Path) -> Option<Rc<AppEntry>> {
        self.entries
            .iter()
            .find(|e| {
                e.exec_path
                    .as_deref()
                    .map(|app_exe| executables_match(exe, app_exe))
                    .unwrap_or(false)
            })
            .cloned()
    }
}

fn executables_match(a: &Path, b: &Path) -> bool {
    if a.is_absolute() && b.is_absolute() {
        return a == b;
    }
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// First token of an Exec line, with desktop-entry field codes removed
fn strip_exec_field_codes(exec: &str) -> Option<PathBuf> {
    let first = exec.split_whitespace().find(|tok| !tok.starts_with('%'))?;
    Some(PathBuf::from(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, exec: Option<&str>, class: Option<&str>) -> AppEntry {
        AppEntry {
            id: id.into(),
            name: id.into(),
            exec_path: exec.map(PathBuf::from),
            startup_wm_class: class.map(str::to_string),
            icon: None,
        }
    }

    #[test]
    fn test_lookup_id_exact_then_case_insensitive() {
        let index = AppIndex::from_entries(vec![
            entry("Firefox", None, None),
            entry("org.gnome.Calculator", None, None),
        ]);
        assert_eq!(index.lookup_id("Firefox").unwrap().id, "Firefox");
        assert_eq!(
            index.lookup_id("org.gnome.calculator").unwrap().id,
            "org.gnome.Calculator"
        );
        assert!(index.lookup_id("nope").is_none());
    }

    #[test]
    fn test_lookup_prefixed_id_requires_unique_match() {
        let index = AppIndex::from_entries(vec![
            entry("kde4-konsole", None, None),
            entry("flatpak-gimp", None, None),
            entry("snap-gimp", None, None),
        ]);
        assert_eq!(index.lookup_prefixed_id("Konsole").unwrap().id, "kde4-konsole");
        // Two candidates end in "-gimp": ambiguous, so not found
        assert!(index.lookup_prefixed_id("gimp").is_none());
    }

    #[test]
    fn test_lookup_executable_path_rules() {
        let index = AppIndex::from_entries(vec![
            entry("abs", Some("/usr/bin/vlc"), None),
            entry("rel", Some("mpv"), None),
        ]);
        // absolute vs absolute: full path comparison
        assert_eq!(
            index.lookup_executable(Path::new("/usr/bin/vlc")).unwrap().id,
            "abs"
        );
        assert!(index.lookup_executable(Path::new("/opt/bin/vlc")).is_none());
        // relative on one side: basename comparison
        assert_eq!(
            index.lookup_executable(Path::new("/usr/local/bin/mpv")).unwrap().id,
            "rel"
        );
    }

    #[test]
    fn test_strip_exec_field_codes() {
        assert_eq!(
            strip_exec_field_codes("/usr/bin/gimp %U"),
            Some(PathBuf::from("/usr/bin/gimp"))
        );
        assert_eq!(
            strip_exec_field_codes("%u firefox"),
            Some(PathBuf::from("firefox"))
        );
        assert_eq!(strip_exec_field_codes("%U"), None);
    }
}

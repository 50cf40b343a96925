//! Skylight
//!
//! Live window/desktop tracking core for an X11 switcher overlay: a tracker
//! that mirrors the window manager's model of windows, workspaces and
//! monitors into a signal-driven in-process model, and a content engine that
//! keeps a presentable texture per window via the Composite and Damage
//! extensions.

pub mod apps;
pub mod backend;
pub mod config;
pub mod content;
pub mod shared;
pub mod tracker;

//! Skylight entry point
//!
//! Assembles the session context (config, backend, tracker, content cache,
//! application index) and runs the blocking event loop. The widget layer
//! consumes the same surface this binary exercises: the tracker's domain
//! events and per-window content handles.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skylight::apps::AppIndex;
use skylight::backend::x11::X11Backend;
use skylight::backend::{CompositeBackend, DesktopBackend, WindowHandle};
use skylight::config::Config;
use skylight::content::cache::ContentCache;
use skylight::content::WindowContent;
use skylight::tracker::events::TrackerEvent;
use skylight::tracker::Tracker;

fn main() -> Result<()> {
    let config = Config::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Skylight desktop tracker");

    let backend = Rc::new(X11Backend::connect(None).context("Failed to set up X11 backend")?);
    let desktop: Rc<dyn DesktopBackend> = Rc::clone(&backend) as Rc<dyn DesktopBackend>;
    let compositor: Rc<dyn CompositeBackend> = Rc::clone(&backend) as Rc<dyn CompositeBackend>;

    let tracker = Tracker::new(desktop);
    let contents = Rc::new(ContentCache::new(
        Rc::clone(&tracker),
        compositor,
        config.content_policy(),
    ));
    let apps = Rc::new(AppIndex::load());

    // Stand-in for the overlay UI: keep a content handle per window so
    // thumbnails stay fresh, and narrate the domain events.
    let held: Rc<RefCell<HashMap<WindowHandle, Rc<WindowContent>>>> =
        Rc::new(RefCell::new(HashMap::new()));
    {
        let contents = Rc::clone(&contents);
        let held = Rc::clone(&held);
        let apps = Rc::clone(&apps);
        tracker.events().connect(move |event| match event {
            TrackerEvent::WindowOpened(window) => {
                let app = window
                    .resolve_application(&apps)
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| "unknown".into());
                info!("Window {} opened: '{}' ({})", window.handle(), window.name(), app);
                held.borrow_mut()
                    .insert(window.handle(), contents.get_or_create(window));
            }
            TrackerEvent::WindowClosed(window) => {
                info!("Window {} closed", window.handle());
                held.borrow_mut().remove(&window.handle());
            }
            TrackerEvent::ActiveWindowChanged { new, .. } => {
                info!(
                    "Active window: {}",
                    new.as_ref()
                        .map(|w| w.name())
                        .unwrap_or_else(|| "none".into())
                );
            }
            TrackerEvent::ActiveWorkspaceChanged { new, .. } => {
                info!(
                    "Active workspace: {}",
                    new.as_ref()
                        .map(|ws| ws.name())
                        .unwrap_or_else(|| "none".into())
                );
            }
            TrackerEvent::WindowMonitorChanged { window, new, .. } => {
                debug!(
                    "Window {} moved to monitor {:?}",
                    window.handle(),
                    new.as_ref().map(|m| m.index())
                );
            }
            TrackerEvent::ScreenSizeChanged { width, height } => {
                info!("Screen size changed: {}x{}", width, height);
            }
            _ => {}
        });
    }

    tracker.sync_initial();
    info!(
        "Tracking {} windows across {} workspaces",
        tracker.windows().len(),
        tracker.workspaces().len()
    );

    loop {
        let events = backend.next_events()?;
        for event in &events {
            tracker.handle_event(event);
            contents.handle_backend_event(event);
        }
    }
}

//! Content Module
//!
//! Keeps a presentable texture per tracked window: live pixels bound to the
//! window's off-screen compositing pixmap while the window is viewable, a
//! static icon fallback otherwise. Reacts to tracker events to acquire and
//! release native resources, and implements the unminimize workaround for
//! window managers that refuse to composite minimized windows.

pub mod cache;
pub mod layout;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

use crate::backend::{CompositeBackend, ContentError, Texture, WindowStates, WindowSurface};
use crate::shared::Geometry;
use crate::tracker::events::{SubscriptionId, TrackerEvent};
use crate::tracker::window::Window;
use crate::tracker::Tracker;
use layout::IconPlacement;

/// Progress of the unminimize workaround
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkaroundMode {
    None,
    /// Unminimize requested, waiting for the state echo
    Unminimizing,
    /// Snapshot taken and re-minimize requested, waiting for the echo
    Reminimizing,
    /// Finished (or abandoned); never re-entered for this content
    Done,
}

/// Operator policy for the content engine
#[derive(Debug, Clone, Copy)]
pub struct ContentPolicy {
    /// Briefly unminimize minimized windows to coax a valid pixmap out of
    /// window managers that invalidate it on minimize
    pub unminimize_workaround: bool,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            unminimize_workaround: false,
        }
    }
}

#[derive(Default)]
struct Resources {
    surface: Option<WindowSurface>,
    damage: Option<u32>,
    /// Static icon texture, shown while no live pixels exist
    fallback: Option<Texture>,
    /// Private copy of the last live texture, taken by the workaround so
    /// re-minimizing does not lose the image
    snapshot: Option<Texture>,
}

/// Shared, cache-issued handle to one window's presentable content.
///
/// Consumers hold `Rc<WindowContent>`; the last handle dropped tears down
/// every native resource.
pub struct WindowContent {
    window: Rc<Window>,
    compositor: Rc<dyn CompositeBackend>,
    tracker: Weak<Tracker>,
    policy: ContentPolicy,
    resources: RefCell<Resources>,
    suspended: Cell<bool>,
    /// Overlay-wide suspend, mirrored from the cache
    app_suspended: Cell<bool>,
    workaround: Cell<WorkaroundMode>,
    lifecycle_sub: Cell<Option<SubscriptionId>>,
    workaround_sub: Cell<Option<SubscriptionId>>,
    repaint_hook: RefCell<Option<Box<dyn Fn()>>>,
    dirty: Cell<bool>,
    closed: Cell<bool>,
}

impl WindowContent {
    /// Construct and wire up a content object. Only the content cache calls
    /// this; everyone else shares the cached handle.
    pub(crate) fn new(
        window: Rc<Window>,
        tracker: &Rc<Tracker>,
        compositor: Rc<dyn CompositeBackend>,
        policy: ContentPolicy,
        app_suspended: bool,
    ) -> Rc<Self> {
        let content = Rc::new(Self {
            window,
            compositor,
            tracker: Rc::downgrade(tracker),
            policy,
            resources: RefCell::new(Resources::default()),
            suspended: Cell::new(true),
            app_suspended: Cell::new(app_suspended),
            workaround: Cell::new(WorkaroundMode::None),
            lifecycle_sub: Cell::new(None),
            workaround_sub: Cell::new(None),
            repaint_hook: RefCell::new(None),
            dirty: Cell::new(false),
            closed: Cell::new(false),
        });

        let weak = Rc::downgrade(&content);
        let sub = tracker.events().connect(move |event| {
            if let Some(content) = weak.upgrade() {
                content.on_tracker_event(event);
            }
        });
        content.lifecycle_sub.set(Some(sub));

        content.try_acquire();
        content
    }

    pub fn window(&self) -> &Rc<Window> {
        &self.window
    }

    /// Current presentable texture: live pixels, else the workaround
    /// snapshot, else the static icon
    pub fn texture(&self) -> Option<Texture> {
        let resources = self.resources.borrow();
        resources
            .surface
            .as_ref()
            .map(|s| s.texture)
            .or(resources.snapshot)
            .or(resources.fallback)
    }

    /// True while the texture is a static icon rather than live pixels
    pub fn is_fallback(&self) -> bool {
        self.resources.borrow().surface.is_none()
    }

    pub fn suspended(&self) -> bool {
        self.suspended.get()
    }

    pub fn workaround_mode(&self) -> WorkaroundMode {
        self.workaround.get()
    }

    /// Size the consumer should allocate: the live texture when present,
    /// otherwise the retained/fallback texture, otherwise window geometry
    pub fn preferred_size(&self) -> (u32, u32) {
        if let Some(texture) = self.texture() {
            return (texture.width, texture.height);
        }
        let geometry = self.window.geometry();
        (geometry.width, geometry.height)
    }

    /// Destination rectangle for the retained texture inside the consumer's
    /// allocation. None while live pixels fill the allocation themselves, or
    /// when no texture exists at all.
    pub fn fallback_rect(
        &self,
        alloc_width: u32,
        alloc_height: u32,
        placement: &IconPlacement,
    ) -> Option<Geometry> {
        if !self.is_fallback() {
            return None;
        }
        let texture = self.texture()?;
        Some(layout::place_icon(
            alloc_width,
            alloc_height,
            texture.width,
            texture.height,
            placement,
        ))
    }

    /// Register the repaint callback invoked on every invalidation
    pub fn set_repaint_hook<F: Fn() + 'static>(&self, hook: F) {
        *self.repaint_hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Take the dirty flag, for consumers that poll instead of hooking
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    /// True while any native pixmap or damage handle is held. Suspended
    /// content must never hold either.
    pub fn has_native_resources(&self) -> bool {
        let resources = self.resources.borrow();
        resources.surface.is_some() || resources.damage.is_some()
    }

    // ------------------------------------------------------------------
    // Event reactions
    // ------------------------------------------------------------------

    fn on_tracker_event(self: &Rc<Self>, event: &TrackerEvent) {
        match event {
            TrackerEvent::WindowGeometryChanged(window) if self.is_own(window) => {
                // The old pixmap keeps the old size; rebind if we were live
                if !self.suspended.get() {
                    self.release_native();
                }
                self.try_acquire();
            }
            TrackerEvent::WindowStateChanged { window, old, new } if self.is_own(window) => {
                let was_minimized = old.contains(WindowStates::MINIMIZED);
                let minimized = new.contains(WindowStates::MINIMIZED);
                if minimized && !was_minimized {
                    self.release_native();
                    self.ensure_fallback();
                } else if !minimized && was_minimized {
                    self.try_acquire();
                }
            }
            TrackerEvent::WindowClosed(window) if self.is_own(window) => {
                self.closed.set(true);
                self.release_native();
                self.abandon_workaround();
                self.disconnect_lifecycle();
            }
            _ => {}
        }
    }

    /// Damage notification for this window's damage object: request a
    /// repaint, no resource churn
    pub(crate) fn handle_damage(&self) {
        if !self.suspended.get() {
            self.invalidate();
        }
    }

    pub(crate) fn set_app_suspended(self: &Rc<Self>, suspended: bool) {
        if self.app_suspended.replace(suspended) == suspended {
            return;
        }
        if suspended {
            self.release_native();
        } else {
            self.try_acquire();
        }
    }

    fn is_own(&self, window: &Rc<Window>) -> bool {
        window.handle() == self.window.handle()
    }

    fn invalidate(&self) {
        self.dirty.set(true);
        if let Some(hook) = self.repaint_hook.borrow().as_ref() {
            hook();
        }
    }

    // ------------------------------------------------------------------
    // Acquisition / release
    // ------------------------------------------------------------------

    /// Try to move into the live state. Every failure path ends suspended
    /// with the previous fallback texture still displayed.
    fn try_acquire(self: &Rc<Self>) {
        if self.closed.get() || self.app_suspended.get() {
            return;
        }
        if self.has_native_resources() {
            return;
        }

        if self.window.is_minimized() {
            if self.policy.unminimize_workaround && self.workaround.get() == WorkaroundMode::None {
                self.begin_workaround();
            }
            self.ensure_fallback();
            return;
        }

        let handle = self.window.handle();
        let surface = match self.compositor.acquire_surface(handle) {
            Ok(surface) => surface,
            Err(e) => {
                debug!("Content acquisition for {} failed, staying suspended: {}", handle, e);
                self.ensure_fallback();
                return;
            }
        };

        let damage = match self.compositor.create_damage(handle) {
            Ok(damage) => Some(damage),
            // Without the extension we stay live, just never get notified
            Err(ContentError::Unavailable(_)) => None,
            Err(e) => {
                debug!("Damage registration for {} failed, falling back: {}", handle, e);
                self.compositor.release_surface(handle, surface);
                self.ensure_fallback();
                return;
            }
        };

        {
            let mut resources = self.resources.borrow_mut();
            resources.surface = Some(surface);
            resources.damage = damage;
        }
        self.suspended.set(false);
        self.invalidate();
    }

    /// Release pixmap and damage immediately and become suspended. Retained
    /// textures (fallback icon, workaround snapshot) survive.
    fn release_native(&self) {
        let (surface, damage) = {
            let mut resources = self.resources.borrow_mut();
            (resources.surface.take(), resources.damage.take())
        };
        if let Some(damage) = damage {
            self.compositor.release_damage(damage);
        }
        if let Some(surface) = surface {
            self.compositor.release_surface(self.window.handle(), surface);
        }
        if !self.suspended.replace(true) {
            self.invalidate();
        }
    }

    /// Make sure a static icon texture exists for the suspended state
    fn ensure_fallback(&self) {
        if self.resources.borrow().fallback.is_some() {
            return;
        }
        let icon = match self.window.icon() {
            Some(icon) => icon,
            None => return,
        };
        match self.compositor.upload_icon(&icon) {
            Ok(texture) => {
                self.resources.borrow_mut().fallback = Some(texture);
                self.invalidate();
            }
            Err(e) => debug!(
                "Icon upload for {} failed: {}",
                self.window.handle(),
                e
            ),
        }
    }

    // ------------------------------------------------------------------
    // Unminimize workaround
    // ------------------------------------------------------------------

    /// Some window managers refuse to produce a valid compositing pixmap for
    /// a minimized window. Briefly unminimize, copy the texture into a
    /// private buffer on the state echo, then re-minimize and detach once
    /// the minimized echo confirms.
    fn begin_workaround(self: &Rc<Self>) {
        debug_assert!(
            self.workaround.get() == WorkaroundMode::None,
            "workaround restarted while in progress"
        );
        let tracker = match self.tracker.upgrade() {
            Some(tracker) => tracker,
            None => return,
        };

        self.workaround.set(WorkaroundMode::Unminimizing);
        let weak = Rc::downgrade(self);
        let sub = tracker.events().connect(move |event| {
            if let Some(content) = weak.upgrade() {
                content.on_workaround_event(event);
            }
        });
        self.workaround_sub.set(Some(sub));

        debug!("Unminimize workaround started for {}", self.window.handle());
        self.window.show();
    }

    fn on_workaround_event(self: &Rc<Self>, event: &TrackerEvent) {
        match event {
            TrackerEvent::WindowStateChanged { window, new, .. } if self.is_own(window) => {
                let minimized = new.contains(WindowStates::MINIMIZED);
                match self.workaround.get() {
                    WorkaroundMode::Unminimizing if !minimized => {
                        // The lifecycle listener has already re-acquired by
                        // now; copy whatever live texture we got.
                        self.take_snapshot();
                        self.workaround.set(WorkaroundMode::Reminimizing);
                        self.window.hide();
                    }
                    WorkaroundMode::Reminimizing if minimized => {
                        self.finish_workaround();
                    }
                    _ => {}
                }
            }
            TrackerEvent::WindowClosed(window) if self.is_own(window) => {
                // Closure mid-sequence must sever the listener cleanly
                self.abandon_workaround();
            }
            _ => {}
        }
    }

    fn take_snapshot(&self) {
        let live = self.resources.borrow().surface.as_ref().map(|s| s.texture);
        let live = match live {
            Some(texture) => texture,
            None => {
                warn!(
                    "Unminimize workaround for {} got no live texture to copy",
                    self.window.handle()
                );
                return;
            }
        };
        match self.compositor.snapshot_texture(&live) {
            Ok(snapshot) => {
                let old = self.resources.borrow_mut().snapshot.replace(snapshot);
                if let Some(old) = old {
                    self.compositor.release_texture(old);
                }
            }
            Err(e) => debug!(
                "Texture snapshot for {} failed: {}",
                self.window.handle(),
                e
            ),
        }
    }

    fn finish_workaround(&self) {
        self.disconnect_workaround();
        self.workaround.set(WorkaroundMode::Done);
        debug!("Unminimize workaround finished for {}", self.window.handle());
    }

    fn abandon_workaround(&self) {
        if self.workaround.get() == WorkaroundMode::Unminimizing
            || self.workaround.get() == WorkaroundMode::Reminimizing
        {
            self.disconnect_workaround();
            self.workaround.set(WorkaroundMode::Done);
        }
    }

    fn disconnect_workaround(&self) {
        if let Some(sub) = self.workaround_sub.take() {
            if let Some(tracker) = self.tracker.upgrade() {
                tracker.events().disconnect(sub);
            }
        }
    }

    fn disconnect_lifecycle(&self) {
        if let Some(sub) = self.lifecycle_sub.take() {
            if let Some(tracker) = self.tracker.upgrade() {
                tracker.events().disconnect(sub);
            }
        }
    }
}

impl Drop for WindowContent {
    fn drop(&mut self) {
        self.disconnect_workaround();
        self.disconnect_lifecycle();
        self.release_native();
        let mut resources = self.resources.borrow_mut();
        if let Some(texture) = resources.fallback.take() {
            self.compositor.release_texture(texture);
        }
        if let Some(texture) = resources.snapshot.take() {
            self.compositor.release_texture(texture);
        }
    }
}

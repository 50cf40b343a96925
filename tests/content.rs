//! Content engine behavior: cache sharing, acquisition and fallback,
//! damage-driven invalidation, the unminimize workaround sequence and the
//! suspend invariant.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{FakeBackend, Op};
use skylight::backend::{BackendEvent, CompositeBackend, DesktopBackend, WindowHandle};
use skylight::content::cache::ContentCache;
use skylight::content::layout::{IconAnchor, IconPlacement};
use skylight::content::{ContentPolicy, WorkaroundMode};
use skylight::shared::Geometry;
use skylight::tracker::Tracker;

fn setup(policy: ContentPolicy) -> (Rc<FakeBackend>, Rc<Tracker>, ContentCache) {
    let fake = FakeBackend::new();
    let tracker = Tracker::new(Rc::clone(&fake) as Rc<dyn DesktopBackend>);
    let cache = ContentCache::new(
        Rc::clone(&tracker),
        Rc::clone(&fake) as Rc<dyn CompositeBackend>,
        policy,
    );
    tracker.sync_initial();
    (fake, tracker, cache)
}

fn open_window(fake: &FakeBackend, tracker: &Rc<Tracker>, id: u32) -> WindowHandle {
    let h = fake.add_window(id, &format!("win{id}"), Geometry::new(0, 0, 640, 480));
    tracker.handle_event(&BackendEvent::WindowOpened(h));
    h
}

/// Feed one backend event the way the session loop does: tracker first,
/// then the content cache.
fn dispatch(tracker: &Rc<Tracker>, cache: &ContentCache, event: BackendEvent) {
    tracker.handle_event(&event);
    cache.handle_backend_event(&event);
}

#[test]
fn test_cache_shares_one_content_per_window() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();

    let first = cache.get_or_create(&window);
    assert_eq!(Rc::strong_count(&first), 1);

    let second = cache.get_or_create(&window);
    assert!(Rc::ptr_eq(&first, &second), "same underlying content");
    assert_eq!(Rc::strong_count(&first), 2, "each call adds exactly one share");
    assert_eq!(cache.live_count(), 1);

    drop(second);
    assert_eq!(Rc::strong_count(&first), 1);
    drop(first);
    assert_eq!(cache.live_count(), 0, "weak entries never keep content alive");
}

#[test]
fn test_live_acquisition_and_damage_invalidation() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();

    let content = cache.get_or_create(&window);
    assert!(!content.suspended());
    assert!(!content.is_fallback());
    assert!(content.has_native_resources());
    let ops = fake.take_ops();
    assert!(ops.contains(&Op::AcquireSurface(h)));
    assert!(ops.contains(&Op::CreateDamage(h)));

    let repaints = Rc::new(Cell::new(0u32));
    let repaints2 = Rc::clone(&repaints);
    content.set_repaint_hook(move || repaints2.set(repaints2.get() + 1));

    dispatch(&tracker, &cache, BackendEvent::WindowDamaged(h));
    assert_eq!(repaints.get(), 1);
    assert!(content.take_dirty());
    // Invalidation must not churn resources
    assert_eq!(fake.take_ops(), vec![]);
    assert!(content.has_native_resources());
}

#[test]
fn test_acquisition_failure_falls_back_to_icon() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    fake.state.borrow_mut().fail_acquire = true;
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();

    let content = cache.get_or_create(&window);
    assert!(content.suspended());
    assert!(content.is_fallback());
    assert!(!content.has_native_resources(), "suspended holds no native handles");
    assert!(content.texture().is_some(), "static icon stands in for live pixels");
    assert!(fake.take_ops().contains(&Op::UploadIcon));
}

#[test]
fn test_fallback_rect_only_while_showing_the_icon() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();
    let content = cache.get_or_create(&window);

    // Live pixels fill the allocation; no icon rectangle to paint
    let placement = IconPlacement::default();
    assert!(content.fallback_rect(200, 200, &placement).is_none());

    fake.set_minimized(h, true);
    dispatch(&tracker, &cache, BackendEvent::WindowStateChanged(h));
    assert!(content.is_fallback());

    // The fake icon is 32x32; centered in a 200x200 allocation
    let rect = content.fallback_rect(200, 200, &placement).unwrap();
    assert_eq!(rect, Geometry::new(84, 84, 32, 32));

    let pinned = IconPlacement {
        anchor: IconAnchor::BottomRight,
        ..IconPlacement::default()
    };
    let rect = content.fallback_rect(200, 200, &pinned).unwrap();
    assert_eq!(rect, Geometry::new(168, 168, 32, 32));
}

#[test]
fn test_minimized_window_without_policy_stays_suspended() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    fake.set_minimized(h, true);
    tracker.handle_event(&BackendEvent::WindowStateChanged(h));
    let window = tracker.window_by_handle(h).unwrap();
    fake.take_ops();

    let content = cache.get_or_create(&window);
    assert!(content.suspended());
    assert_eq!(content.workaround_mode(), WorkaroundMode::None);
    let ops = fake.take_ops();
    assert!(!ops.contains(&Op::Show(h)), "no workaround without the policy flag");
    assert!(ops.contains(&Op::UploadIcon));
}

#[test]
fn test_unminimize_workaround_runs_the_exact_sequence() {
    let policy = ContentPolicy {
        unminimize_workaround: true,
    };
    let (fake, tracker, cache) = setup(policy);
    let h = open_window(&fake, &tracker, 1);
    fake.set_minimized(h, true);
    tracker.handle_event(&BackendEvent::WindowStateChanged(h));
    let window = tracker.window_by_handle(h).unwrap();
    fake.take_ops();

    // Step 1: creation requests the unminimize
    let content = cache.get_or_create(&window);
    assert_eq!(content.workaround_mode(), WorkaroundMode::Unminimizing);
    assert!(fake.take_ops().contains(&Op::Show(h)));

    // Step 2: the unminimized echo arrives; the engine binds the now-valid
    // pixmap, copies it into the private snapshot and asks to re-minimize
    fake.set_minimized(h, false);
    dispatch(&tracker, &cache, BackendEvent::WindowStateChanged(h));
    assert_eq!(content.workaround_mode(), WorkaroundMode::Reminimizing);
    let ops = fake.take_ops();
    let kinds: Vec<&Op> = ops.iter().collect();
    assert!(matches!(kinds[0], Op::AcquireSurface(w) if *w == h));
    assert!(ops.iter().any(|op| matches!(op, Op::Snapshot(_))));
    let snapshot_pos = ops.iter().position(|op| matches!(op, Op::Snapshot(_))).unwrap();
    let hide_pos = ops.iter().position(|op| *op == Op::Hide(h)).unwrap();
    assert!(snapshot_pos < hide_pos, "snapshot taken before re-minimize");

    // Step 3: the minimized echo confirms; the listener detaches and native
    // resources are gone, but the snapshot keeps the last good image
    fake.set_minimized(h, true);
    dispatch(&tracker, &cache, BackendEvent::WindowStateChanged(h));
    assert_eq!(content.workaround_mode(), WorkaroundMode::Done);
    assert!(content.suspended());
    assert!(!content.has_native_resources());
    assert!(content.texture().is_some(), "snapshot survives re-minimize");
    fake.take_ops();

    // Detached: another unminimize echo re-acquires through the normal
    // lifecycle path but never re-runs the workaround choreography
    fake.set_minimized(h, false);
    dispatch(&tracker, &cache, BackendEvent::WindowStateChanged(h));
    let ops = fake.take_ops();
    assert!(ops.contains(&Op::AcquireSurface(h)));
    assert!(!ops.iter().any(|op| matches!(op, Op::Snapshot(_) | Op::Hide(_) | Op::Show(_))));
}

#[test]
fn test_workaround_interrupted_by_close_detaches_cleanly() {
    let policy = ContentPolicy {
        unminimize_workaround: true,
    };
    let (fake, tracker, cache) = setup(policy);
    let h = open_window(&fake, &tracker, 1);
    fake.set_minimized(h, true);
    tracker.handle_event(&BackendEvent::WindowStateChanged(h));
    let window = tracker.window_by_handle(h).unwrap();

    let content = cache.get_or_create(&window);
    assert_eq!(content.workaround_mode(), WorkaroundMode::Unminimizing);

    // The window closes between the unminimize request and its echo
    fake.remove_window(h);
    dispatch(&tracker, &cache, BackendEvent::WindowClosed(h));
    assert_eq!(content.workaround_mode(), WorkaroundMode::Done);
    assert!(!content.has_native_resources());

    // No dangling listener: further state traffic reaches nothing
    fake.take_ops();
    tracker.handle_event(&BackendEvent::WindowStateChanged(h));
    assert_eq!(fake.take_ops(), vec![]);
}

#[test]
fn test_global_suspend_releases_and_resume_reacquires() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();
    let content = cache.get_or_create(&window);
    assert!(content.has_native_resources());
    fake.take_ops();

    cache.set_suspended(true);
    assert!(content.suspended());
    assert!(!content.has_native_resources());
    let ops = fake.take_ops();
    assert!(ops.contains(&Op::ReleaseSurface(h)));

    cache.set_suspended(false);
    assert!(!content.suspended());
    assert!(content.has_native_resources());
}

#[test]
fn test_minimize_releases_and_unminimize_reacquires() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();
    let content = cache.get_or_create(&window);
    fake.take_ops();

    fake.set_minimized(h, true);
    dispatch(&tracker, &cache, BackendEvent::WindowStateChanged(h));
    assert!(content.suspended());
    assert!(!content.has_native_resources());

    fake.set_minimized(h, false);
    dispatch(&tracker, &cache, BackendEvent::WindowStateChanged(h));
    assert!(!content.suspended());
    assert!(content.has_native_resources());
}

#[test]
fn test_resize_rebinds_the_pixmap() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();
    let content = cache.get_or_create(&window);
    fake.take_ops();

    fake.with_window(h, |w| w.geometry = Geometry::new(0, 0, 800, 600));
    dispatch(&tracker, &cache, BackendEvent::WindowGeometryChanged(h));

    let ops = fake.take_ops();
    assert!(ops.contains(&Op::ReleaseSurface(h)), "old-size pixmap released");
    assert!(ops.contains(&Op::AcquireSurface(h)), "new-size pixmap bound");
    let texture = content.texture().unwrap();
    assert_eq!((texture.width, texture.height), (800, 600));
}

#[test]
fn test_dropping_the_last_handle_tears_down_native_resources() {
    let (fake, tracker, cache) = setup(ContentPolicy::default());
    let h = open_window(&fake, &tracker, 1);
    let window = tracker.window_by_handle(h).unwrap();

    let content = cache.get_or_create(&window);
    assert!(content.has_native_resources());
    fake.take_ops();

    drop(content);
    let ops = fake.take_ops();
    assert!(ops.contains(&Op::ReleaseSurface(h)));
    assert!(ops.iter().any(|op| matches!(op, Op::ReleaseDamage(_))));
    assert_eq!(cache.live_count(), 0);
}

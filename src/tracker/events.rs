//! Tracker Events Module
//!
//! The normalized domain-event vocabulary published by the tracker, and the
//! single-threaded signal bus that carries it. The tracker is the only
//! publisher; the UI layer and the content engine subscribe here instead of
//! chaining relays off raw backend notifications.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::backend::{WindowActions, WindowStates};
use crate::tracker::monitor::Monitor;
use crate::tracker::window::Window;
use crate::tracker::workspace::Workspace;

/// Normalized desktop-state change
#[derive(Clone)]
pub enum TrackerEvent {
    WindowOpened(Rc<Window>),
    WindowClosed(Rc<Window>),
    WindowGeometryChanged(Rc<Window>),
    WindowStateChanged {
        window: Rc<Window>,
        old: WindowStates,
        new: WindowStates,
    },
    WindowActionsChanged {
        window: Rc<Window>,
        old: WindowActions,
        new: WindowActions,
    },
    WindowNameChanged(Rc<Window>),
    WindowIconChanged(Rc<Window>),
    WindowWorkspaceChanged {
        window: Rc<Window>,
        workspace: Option<Rc<Workspace>>,
    },
    WindowMonitorChanged {
        window: Rc<Window>,
        old: Option<Rc<Monitor>>,
        new: Option<Rc<Monitor>>,
    },
    StackingChanged,
    ActiveWindowChanged {
        old: Option<Rc<Window>>,
        new: Option<Rc<Window>>,
    },
    WorkspaceAdded(Rc<Workspace>),
    WorkspaceRemoved(Rc<Workspace>),
    WorkspaceRenamed(Rc<Workspace>),
    ActiveWorkspaceChanged {
        old: Option<Rc<Workspace>>,
        new: Option<Rc<Workspace>>,
    },
    MonitorAdded(Rc<Monitor>),
    MonitorRemoved(Rc<Monitor>),
    MonitorGeometryChanged(Rc<Monitor>),
    PrimaryMonitorChanged(Rc<Monitor>),
    ScreenSizeChanged {
        width: u32,
        height: u32,
    },
}

/// Subscription id returned by `Signal::connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Slot<E> {
    id: SubscriptionId,
    // Taken out while the callback runs so dispatch can release the borrow
    callback: Option<Box<dyn FnMut(&E)>>,
    dead: bool,
}

/// Single-threaded signal with reentrancy-safe connect/disconnect.
///
/// Listeners may disconnect themselves (or others) from inside a dispatch;
/// listeners connected during a dispatch are not invoked for the event that
/// is currently being delivered.
pub struct Signal<E> {
    slots: RefCell<Vec<Slot<E>>>,
    next_id: Cell<u64>,
    dispatch_depth: Cell<u32>,
}

impl<E> Signal<E> {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            dispatch_depth: Cell::new(0),
        }
    }

    pub fn connect<F: FnMut(&E) + 'static>(&self, callback: F) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.slots.borrow_mut().push(Slot {
            id,
            callback: Some(Box::new(callback)),
            dead: false,
        });
        id
    }

    pub fn disconnect(&self, id: SubscriptionId) {
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.iter_mut().find(|s| s.id == id) {
            slot.dead = true;
            slot.callback = None;
        }
        // Compaction must wait while a dispatch is walking the list
        if self.dispatch_depth.get() == 0 {
            slots.retain(|s| !s.dead);
        }
    }

    pub fn emit(&self, event: &E) {
        self.dispatch_depth.set(self.dispatch_depth.get() + 1);
        let count = self.slots.borrow().len();
        for index in 0..count {
            let taken = {
                let mut slots = self.slots.borrow_mut();
                match slots.get_mut(index) {
                    Some(slot) if !slot.dead => slot.callback.take().map(|cb| (slot.id, cb)),
                    _ => None,
                }
            };
            if let Some((id, mut callback)) = taken {
                callback(event);
                let mut slots = self.slots.borrow_mut();
                if let Some(slot) = slots.iter_mut().find(|s| s.id == id) {
                    if !slot.dead {
                        slot.callback = Some(callback);
                    }
                }
            }
        }
        self.dispatch_depth.set(self.dispatch_depth.get() - 1);
        if self.dispatch_depth.get() == 0 {
            self.slots.borrow_mut().retain(|s| !s.dead);
        }
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_emit() {
        let signal: Signal<u32> = Signal::new();
        let seen = Rc::new(Cell::new(0u32));
        let seen2 = Rc::clone(&seen);
        signal.connect(move |v| seen2.set(seen2.get() + v));
        signal.emit(&3);
        signal.emit(&4);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let signal: Signal<u32> = Signal::new();
        let seen = Rc::new(Cell::new(0u32));
        let seen2 = Rc::clone(&seen);
        let id = signal.connect(move |v| seen2.set(seen2.get() + v));
        signal.emit(&1);
        signal.disconnect(id);
        signal.emit(&1);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_listener_can_disconnect_itself_mid_dispatch() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let seen = Rc::new(Cell::new(0u32));

        let id_cell: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let signal2 = Rc::clone(&signal);
        let id_cell2 = Rc::clone(&id_cell);
        let seen2 = Rc::clone(&seen);
        let id = signal.connect(move |_| {
            seen2.set(seen2.get() + 1);
            if let Some(id) = id_cell2.get() {
                signal2.disconnect(id);
            }
        });
        id_cell.set(Some(id));

        signal.emit(&0);
        signal.emit(&0);
        assert_eq!(seen.get(), 1, "listener ran once then severed itself");
    }

    #[test]
    fn test_listener_connected_during_dispatch_waits_for_next_event() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let late_calls = Rc::new(Cell::new(0u32));

        let signal2 = Rc::clone(&signal);
        let late2 = Rc::clone(&late_calls);
        let armed = Rc::new(Cell::new(false));
        let armed2 = Rc::clone(&armed);
        signal.connect(move |_| {
            if !armed2.get() {
                armed2.set(true);
                let late3 = Rc::clone(&late2);
                signal2.connect(move |_| late3.set(late3.get() + 1));
            }
        });

        signal.emit(&0);
        assert_eq!(late_calls.get(), 0);
        signal.emit(&0);
        assert_eq!(late_calls.get(), 1);
    }
}

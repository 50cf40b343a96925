//! Monitor Module
//!
//! Facade over one physical display output. The tracker mutates geometry and
//! the primary flag in place when the display backend reports changes; the
//! monitor object itself stays alive across reconfigurations as long as its
//! index exists.

use std::cell::Cell;

use crate::shared::Geometry;

pub struct Monitor {
    index: usize,
    geometry: Cell<Geometry>,
    primary: Cell<bool>,
}

impl Monitor {
    pub(crate) fn new(index: usize, geometry: Geometry, primary: bool) -> Self {
        Self {
            index,
            geometry: Cell::new(geometry),
            primary: Cell::new(primary),
        }
    }

    /// Index within the display; the monitor's identity
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry.get()
    }

    pub fn is_primary(&self) -> bool {
        self.primary.get()
    }

    /// Check whether a point lies on this monitor
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.geometry.get().contains(x, y)
    }

    pub(crate) fn set_geometry(&self, geometry: Geometry) {
        self.geometry.set(geometry);
    }

    pub(crate) fn set_primary(&self, primary: bool) {
        self.primary.set(primary);
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("index", &self.index)
            .field("geometry", &self.geometry.get())
            .field("primary", &self.primary.get())
            .finish()
    }
}

//! Workspace Module
//!
//! Thin facade over one virtual desktop. Workspaces are created and removed
//! only on explicit backend add/remove notifications; the backend-assigned
//! number is the identity.

use std::cell::{Cell, RefCell};

pub struct Workspace {
    number: u32,
    name: RefCell<String>,
    size: Cell<(u32, u32)>,
}

impl Workspace {
    pub(crate) fn new(number: u32, name: String, width: u32, height: u32) -> Self {
        Self {
            number,
            name: RefCell::new(name),
            size: Cell::new((width, height)),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn width(&self) -> u32 {
        self.size.get().0
    }

    pub fn height(&self) -> u32 {
        self.size.get().1
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    pub(crate) fn set_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("number", &self.number)
            .field("name", &self.name.borrow())
            .finish()
    }
}

//! In-memory cart. Playback only cares about when it last changed, so a cart
//! add/remove can open the coordinator's suppression window.

use crate::components::audio_manager::CartActivity;
use crate::platform::Clock;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    pub track_id: String,
    /// `None` for the full track.
    pub stem_id: Option<String>,
    pub label: String,
}

pub struct Cart {
    items: RefCell<Vec<CartItem>>,
    last_mutation_ms: Cell<Option<i64>>,
    clock: Rc<dyn Clock>,
}

impl Cart {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            items: RefCell::new(Vec::new()),
            last_mutation_ms: Cell::new(None),
            clock,
        }
    }

    fn touch(&self) {
        self.last_mutation_ms.set(Some(self.clock.now_ms()));
    }

    /// Returns `false` when the item is already in the cart.
    pub fn add(&self, item: CartItem) -> bool {
        if self.contains(&item.track_id, item.stem_id.as_deref()) {
            return false;
        }
        self.items.borrow_mut().push(item);
        self.touch();
        true
    }

    pub fn remove(&self, track_id: &str, stem_id: Option<&str>) -> bool {
        let mut items = self.items.borrow_mut();
        let before = items.len();
        items.retain(|item| !(item.track_id == track_id && item.stem_id.as_deref() == stem_id));
        let removed = items.len() != before;
        drop(items);
        if removed {
            self.touch();
        }
        removed
    }

    /// Add when absent, remove when present. Returns whether it is now in the cart.
    pub fn toggle(&self, item: CartItem) -> bool {
        if self.remove(&item.track_id, item.stem_id.as_deref()) {
            false
        } else {
            self.add(item)
        }
    }

    pub fn contains(&self, track_id: &str, stem_id: Option<&str>) -> bool {
        self.items
            .borrow()
            .iter()
            .any(|item| item.track_id == track_id && item.stem_id.as_deref() == stem_id)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl CartActivity for Cart {
    fn last_mutation_ms(&self) -> Option<i64> {
        self.last_mutation_ms.get()
    }
}

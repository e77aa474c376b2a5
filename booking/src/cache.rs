//! Advisory client-side cache of slot listings.
//!
//! Nothing here is authoritative. Local edits after a reserve or release keep
//! the board readable, but only a fresh server read clears the stale flag.

use crate::types::{Shift, Slot, SlotId, SlotStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A value together with whether it still reflects the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cached<T> {
    value: T,
    stale: bool,
}

impl<T> Cached<T> {
    /// A value just read from the server
    pub const fn fresh(value: T) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    /// A value that must be re-read before anyone relies on it
    pub const fn stale(value: T) -> Self {
        Self { value, stale: true }
    }

    /// Flag the value as out of date
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Whether the value needs a fresh read
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// The cached value
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// Replace with a server read; the only way staleness is cleared
    pub fn replace_from_server(&mut self, value: T) {
        self.value = value;
        self.stale = false;
    }

    /// Edit the cached value locally; staleness is left as is
    pub fn edit(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
    }
}

impl<T: Default> Default for Cached<T> {
    fn default() -> Self {
        Self::stale(T::default())
    }
}

/// Slots for one `(date, shift)` scope
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotBoard {
    scope: Option<(NaiveDate, Shift)>,
    slots: Cached<Vec<Slot>>,
}

impl SlotBoard {
    /// Date and shift the slots were listed for
    #[must_use]
    pub const fn scope(&self) -> Option<(NaiveDate, Shift)> {
        self.scope
    }

    /// Cached slots, possibly stale
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        self.slots.value()
    }

    /// Whether the board must be refreshed before use
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.slots.is_stale()
    }

    /// Look up a slot by id
    #[must_use]
    pub fn get(&self, slot_id: SlotId) -> Option<&Slot> {
        self.slots().iter().find(|slot| slot.slot_id == slot_id)
    }

    /// Switch to a new scope; previous slots are dropped and the board is stale
    pub fn rescope(&mut self, date: NaiveDate, shift: Shift) {
        if self.scope != Some((date, shift)) {
            self.scope = Some((date, shift));
            self.slots = Cached::stale(Vec::new());
        } else {
            self.slots.mark_stale();
        }
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.scope = None;
        self.slots = Cached::stale(Vec::new());
    }

    /// Flag the board for refresh
    pub fn mark_stale(&mut self) {
        self.slots.mark_stale();
    }

    /// Install a server listing.
    ///
    /// Returns `false` and ignores the listing when it belongs to a scope the
    /// board has since moved away from.
    pub fn load(&mut self, date: NaiveDate, shift: Shift, slots: Vec<Slot>) -> bool {
        if self.scope != Some((date, shift)) {
            return false;
        }
        self.slots.replace_from_server(slots);
        true
    }

    /// Locally reflect a reserve or release outcome
    pub fn set_status(&mut self, slot_id: SlotId, status: SlotStatus) {
        self.slots.edit(|slots| {
            if let Some(slot) = slots.iter_mut().find(|slot| slot.slot_id == slot_id) {
                slot.status = status;
            }
        });
    }
}

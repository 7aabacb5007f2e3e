//! SN-indexed arena
//!
//! Dense storage of `window_size` slots addressed by `sn mod window_size`.
//! Entities only ever hold SNs of one window at a time, so two live SNs never
//! share a slot.

use super::sn::SnSpace;

/// Window-sized arena of per-SN entries
#[derive(Debug)]
pub struct SnArena<T> {
    space: SnSpace,
    slots: Vec<Option<(u32, Box<T>)>>,
    len: usize,
}

impl<T> SnArena<T> {
    /// Create an empty arena covering one window of `space`
    pub fn new(space: SnSpace) -> Self {
        let slots = (0..space.window_size()).map(|_| None).collect();
        Self { space, slots, len: 0 }
    }

    fn index(&self, sn: u32) -> usize {
        (sn % self.space.window_size()) as usize
    }

    /// Store `value` for `sn`, returning whatever occupied the slot before
    pub fn insert(&mut self, sn: u32, value: T) -> Option<(u32, T)> {
        let idx = self.index(sn);
        let previous = self.slots[idx].replace((sn, Box::new(value)));
        if previous.is_none() {
            self.len += 1;
        }
        previous.map(|(old_sn, old)| (old_sn, *old))
    }

    /// Entry stored for `sn`
    pub fn get(&self, sn: u32) -> Option<&T> {
        match &self.slots[self.index(sn)] {
            Some((stored, value)) if *stored == sn => Some(&**value),
            _ => None,
        }
    }

    /// Mutable entry stored for `sn`
    pub fn get_mut(&mut self, sn: u32) -> Option<&mut T> {
        let idx = self.index(sn);
        match &mut self.slots[idx] {
            Some((stored, value)) if *stored == sn => Some(&mut **value),
            _ => None,
        }
    }

    /// Whether an entry exists for `sn`
    pub fn contains(&self, sn: u32) -> bool {
        self.get(sn).is_some()
    }

    /// Remove and return the entry for `sn`
    pub fn remove(&mut self, sn: u32) -> Option<T> {
        if !self.contains(sn) {
            return None;
        }
        let idx = self.index(sn);
        self.len -= 1;
        self.slots[idx].take().map(|(_, value)| *value)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no entry
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
    }

    /// Iterate over stored entries in slot order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.as_ref().map(|(_, value)| &**value))
    }
}

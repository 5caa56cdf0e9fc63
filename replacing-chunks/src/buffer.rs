use core::iter;

use crate::key::KeySet;
use crate::{Record, Slot};

/// The growable backing store of a [`crate::ChunksArray`].
///
/// Placeholder slots only ever form a prefix: they stand for records known to precede the first
/// fetched one that have not been (re)fetched yet. Every filled slot's identity is tracked so an
/// incoming batch can be checked for duplicates without scanning.
#[derive(Clone, Debug)]
pub(crate) struct Buffer<T: Record> {
    slots: Vec<Slot<T>>,
    placeholders: usize,
    ids: KeySet<T::Id>,
}

impl<T: Record> Default for Buffer<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            placeholders: 0,
            ids: KeySet::default(),
        }
    }
}

impl<T: Record> Buffer<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when no record is loaded (placeholders do not count).
    pub(crate) fn has_no_items(&self) -> bool {
        self.slots.len() == self.placeholders
    }

    pub(crate) fn placeholders(&self) -> usize {
        self.placeholders
    }

    pub(crate) fn slots(&self) -> &[Slot<T>] {
        &self.slots
    }

    pub(crate) fn item(&self, pos: usize) -> Option<&T> {
        self.slots.get(pos).and_then(Slot::as_item)
    }

    pub(crate) fn first_item(&self) -> Option<&T> {
        self.item(self.placeholders)
    }

    pub(crate) fn last_item(&self) -> Option<&T> {
        self.slots.last().and_then(Slot::as_item)
    }

    pub(crate) fn contains_id(&self, id: &T::Id) -> bool {
        self.ids.contains(id)
    }

    pub(crate) fn position_of_index(&self, index: &T::Index) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_item().is_some_and(|item| item.index() == *index))
    }

    pub(crate) fn position_of_id(&self, id: &T::Id) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| slot.as_item().is_some_and(|item| item.id() == *id))
    }

    /// Drops every record of `items` that is already loaded.
    pub(crate) fn retain_new(&self, items: &mut Vec<T>) -> usize {
        let before = items.len();
        items.retain(|item| !self.contains_id(&item.id()));
        before - items.len()
    }

    /// Places `items` right before the first loaded record, overwriting placeholders.
    ///
    /// When there are more items than placeholders, the head grows by the shortfall first.
    /// Returns the number of slots inserted at the head.
    pub(crate) fn prepend(&mut self, items: Vec<T>) -> usize {
        let n = items.len();
        let grown = n.saturating_sub(self.placeholders);
        if grown > 0 {
            self.slots
                .splice(0..0, iter::repeat_with(|| Slot::Empty).take(grown));
            self.placeholders += grown;
        }
        let at = self.placeholders - n;
        for (i, item) in items.into_iter().enumerate() {
            self.ids.insert(item.id());
            self.slots[at + i] = Slot::Filled(item);
        }
        self.placeholders = at;
        grown
    }

    pub(crate) fn push_back(&mut self, items: Vec<T>) {
        self.slots.reserve(items.len());
        for item in items {
            self.ids.insert(item.id());
            self.slots.push(Slot::Filled(item));
        }
    }

    pub(crate) fn replace_all(&mut self, items: Vec<T>) {
        self.slots.clear();
        self.ids.clear();
        self.placeholders = 0;
        self.push_back(items);
    }

    /// Removes all head placeholders. Returns how many were removed.
    pub(crate) fn trim_placeholders(&mut self) -> usize {
        let removed = self.placeholders;
        if removed > 0 {
            self.slots.drain(0..removed);
            self.placeholders = 0;
        }
        removed
    }

    /// Rewrites the buffer for a non-head reload.
    ///
    /// Positions `[0, at)` become placeholders and `items` are written from `at`. When
    /// `keep_tail` is set, the records previously located after the old position of the last
    /// reloaded record are kept, minus the ones `items` already contains. Returns whether any
    /// of them survived.
    pub(crate) fn splice_reload(&mut self, at: usize, items: Vec<T>, keep_tail: bool) -> bool {
        let cut = items
            .last()
            .and_then(|last| self.position_of_id(&last.id()))
            .map_or(at.saturating_add(items.len()), |pos| pos + 1);
        let tail = if keep_tail && cut < self.slots.len() {
            self.slots.split_off(cut)
        } else {
            Vec::new()
        };

        self.slots.clear();
        self.ids.clear();
        self.slots
            .extend(iter::repeat_with(|| Slot::Empty).take(at));
        self.placeholders = at;
        self.push_back(items);

        let tail: Vec<T> = tail
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Filled(item) if !self.ids.contains(&item.id()) => Some(item),
                _ => None,
            })
            .collect();
        let kept = !tail.is_empty();
        self.push_back(tail);
        kept
    }
}

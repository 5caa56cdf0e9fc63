use core::ops::Range;

use crate::Slot;

/// A read-only projection of the visible part of the buffer.
///
/// The range it is built from never includes a placeholder, so every accessor yields records.
#[derive(Debug)]
pub struct WindowView<'a, T> {
    slots: &'a [Slot<T>],
    /// Buffer position of the first visible slot.
    offset: usize,
}

impl<'a, T> WindowView<'a, T> {
    pub(crate) fn new(slots: &'a [Slot<T>], range: Range<usize>) -> Self {
        debug_assert!(
            slots[range.clone()].iter().all(|slot| !slot.is_empty()),
            "WindowView: visible range exposes a placeholder ({range:?})"
        );
        Self {
            offset: range.start,
            slots: &slots[range],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Buffer position of `object_at(0)`.
    pub fn buffer_offset(&self) -> usize {
        self.offset
    }

    pub fn object_at(&self, i: usize) -> Option<&'a T> {
        self.slots.get(i).and_then(Slot::as_item)
    }

    pub fn first(&self) -> Option<&'a T> {
        self.object_at(0)
    }

    pub fn last(&self) -> Option<&'a T> {
        self.slots.last().and_then(Slot::as_item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + 'a {
        self.slots.iter().filter_map(Slot::as_item)
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }
}

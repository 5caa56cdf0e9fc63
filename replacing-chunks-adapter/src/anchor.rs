use core::fmt;

use replacing_chunks::{ChunksArray, Record};

/// A row anchor that can be used to keep a record in place across buffer rewrites.
///
/// Typical use cases:
/// - a reload or jump that rebuilds the buffer around the current window
/// - placeholders above the window being refilled
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowAnchor<K> {
    pub key: K,
    /// Rows between the window start and the anchored record.
    pub offset_in_window: usize,
}

impl<K: fmt::Debug> fmt::Debug for RowAnchor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowAnchor")
            .field("key", &self.key)
            .field("offset_in_window", &self.offset_in_window)
            .finish()
    }
}

/// Captures an anchor for the first visible record (by identity).
///
/// Returns `None` if nothing is visible.
pub fn capture_first_visible_anchor<T: Record>(array: &ChunksArray<T>) -> Option<RowAnchor<T::Id>> {
    let start = array.start();
    let key = array.first_item()?.id();
    let pos = array.position_of(&key)?;
    Some(RowAnchor {
        key,
        offset_in_window: pos.saturating_sub(start),
    })
}

/// Moves the window (keeping its width) so the anchored record sits `offset_in_window` rows
/// below the window start again.
///
/// Returns `true` when the anchor was found in the buffer.
pub fn apply_anchor<T: Record>(array: &ChunksArray<T>, anchor: &RowAnchor<T::Id>) -> bool {
    let Some(pos) = array.position_of(&anchor.key) else {
        return false;
    };
    let width = array.end() - array.start();
    let start = pos.saturating_sub(anchor.offset_in_window);
    array.set_window(start, start + width);
    true
}

use core::ops::Range;

use crate::buffer::Buffer;
use crate::state::WindowState;
use crate::{FetchError, Record, WindowView};

/// Window bookkeeping over a [`Buffer`].
///
/// Everything here is synchronous: the async side (`ChunksArray`) decides *what* to fetch from a
/// plan computed here, awaits the source, then hands the result back to one of the `apply_*`
/// methods. No method ever awaits, so the state lock is never held across a suspension point.
#[derive(Clone, Debug)]
pub(crate) struct Window<T: Record> {
    pub(crate) buffer: Buffer<T>,
    start: usize,
    end: usize,
    reached_start: bool,
    reached_end: bool,
    /// The head was reached at least once, so the placeholder count is exact.
    head_known: bool,
    is_reloading: bool,
    initial_load_done: bool,
    error: Option<FetchError>,
}

/// Where a directional fetch starts and how many items it asks for.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FetchPlan<I> {
    pub(crate) anchor: Option<I>,
    pub(crate) size: usize,
    pub(crate) offset: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ReloadPlan<I> {
    Head { size: usize },
    /// Reload anchored at an existing record. `at` is where the reply's first record lands:
    /// the anchor's position shifted by `offset`, which never reaches below position 0.
    Tail {
        at: usize,
        anchor: I,
        size: usize,
        offset: i64,
    },
}

impl<T: Record> Window<T> {
    pub(crate) fn new(start: usize, end: usize) -> Self {
        Self {
            buffer: Buffer::new(),
            start,
            end: end.max(start),
            reached_start: false,
            reached_end: false,
            head_known: false,
            is_reloading: false,
            initial_load_done: false,
            error: None,
        }
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    pub(crate) fn set_bounds(&mut self, start: usize, end: usize) {
        self.start = start;
        self.end = end.max(start);
    }

    pub(crate) fn reached_start(&self) -> bool {
        self.reached_start
    }

    pub(crate) fn reached_end(&self) -> bool {
        self.reached_end
    }

    pub(crate) fn is_reloading(&self) -> bool {
        self.is_reloading
    }

    pub(crate) fn set_reloading(&mut self, is_reloading: bool) {
        self.is_reloading = is_reloading;
    }

    pub(crate) fn initial_load_done(&self) -> bool {
        self.initial_load_done
    }

    pub(crate) fn mark_initial_load_done(&mut self) {
        self.initial_load_done = true;
    }

    pub(crate) fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub(crate) fn record_error(&mut self, err: FetchError) {
        self.error = Some(err);
    }

    pub(crate) fn clear_error(&mut self) {
        self.error = None;
    }

    /// Buffer positions currently exposed to consumers.
    pub(crate) fn visible_range(&self) -> Range<usize> {
        let len = self.buffer.len();
        let lo = self.start.max(self.buffer.placeholders()).min(len);
        let hi = self.end.min(len).max(lo);
        lo..hi
    }

    pub(crate) fn view(&self) -> WindowView<'_, T> {
        WindowView::new(self.buffer.slots(), self.visible_range())
    }

    pub(crate) fn state(&self) -> WindowState {
        WindowState {
            start: self.start,
            end: self.end,
            buffer_len: self.buffer.len(),
            placeholders: self.buffer.placeholders(),
            reached_start: self.reached_start,
            reached_end: self.reached_end,
            is_reloading: self.is_reloading,
            initial_load_done: self.initial_load_done,
            has_error: self.error.is_some(),
        }
    }

    /// `start - threshold <= empty_boundary`, or nothing loaded yet; never once the head is
    /// reached.
    pub(crate) fn backward_needed(&self, threshold: usize) -> bool {
        if self.reached_start {
            return false;
        }
        self.buffer.has_no_items() || self.start < self.buffer.placeholders() + threshold
    }

    /// `end + threshold >= len`, unless a reload is in progress or the tail is reached.
    pub(crate) fn forward_needed(&self, threshold: usize) -> bool {
        !self.is_reloading
            && !self.reached_end
            && self.end.saturating_add(threshold) >= self.buffer.len()
    }

    pub(crate) fn plan_prev(&self, chunk_size: usize) -> FetchPlan<T::Index> {
        let Some(first) = self.buffer.first_item() else {
            return FetchPlan {
                anchor: None,
                size: chunk_size,
                offset: 0,
            };
        };
        let placeholders = self.buffer.placeholders();
        let size = if self.head_known && placeholders > 0 {
            placeholders.min(chunk_size)
        } else {
            chunk_size
        };
        FetchPlan {
            anchor: Some(first.index()),
            size,
            offset: -(size as i64),
        }
    }

    /// Head growth a backward batch of `fetched` records would cause.
    pub(crate) fn prev_growth(&self, fetched: usize) -> usize {
        if self.buffer.has_no_items() {
            return 0;
        }
        fetched.saturating_sub(self.buffer.placeholders())
    }

    /// Placeholders a backward batch of `fetched` records would leave behind and trim because
    /// the head was reached.
    pub(crate) fn prev_trim(&self, fetched: usize, end_reached: bool) -> usize {
        if self.buffer.has_no_items() || !(end_reached || fetched == 0) {
            return 0;
        }
        self.buffer.placeholders().saturating_sub(fetched)
    }

    /// Applies a deduplicated backward batch. Returns the number of slots inserted at the head
    /// and the number of placeholders trimmed from it.
    pub(crate) fn apply_prev(&mut self, items: Vec<T>, end_reached: bool) -> (usize, usize) {
        if self.buffer.has_no_items() {
            // Nothing to anchor on: the batch was loaded from the very beginning.
            self.buffer.replace_all(items);
            self.reached_start = true;
            self.head_known = true;
            self.reached_end = end_reached;
            return (0, 0);
        }

        let no_progress = items.is_empty();
        let inserted = self.buffer.prepend(items);
        self.start += inserted;
        self.end += inserted;

        let mut removed = 0;
        if end_reached || no_progress {
            removed = self.buffer.trim_placeholders();
            self.start = self.start.saturating_sub(removed);
            self.end = self.end.saturating_sub(removed);
            self.reached_start = true;
            self.head_known = true;
        } else {
            self.reached_start = false;
        }
        (inserted, removed)
    }

    pub(crate) fn plan_next(&self, chunk_size: usize) -> FetchPlan<T::Index> {
        match self.buffer.last_item() {
            Some(last) => FetchPlan {
                anchor: Some(last.index()),
                size: chunk_size,
                offset: 1,
            },
            None => FetchPlan {
                anchor: None,
                size: chunk_size,
                offset: 0,
            },
        }
    }

    /// Appends a deduplicated forward batch.
    pub(crate) fn apply_next(&mut self, items: Vec<T>, end_reached: bool) {
        let no_progress = items.is_empty();
        self.buffer.push_back(items);
        self.reached_end = end_reached || no_progress;
    }

    pub(crate) fn plan_reload(
        &self,
        head: bool,
        min_size: usize,
        margin: usize,
        offset: i64,
    ) -> ReloadPlan<T::Index> {
        let width = self.end - self.start;
        if !head {
            let len = self.buffer.len();
            let pos = self
                .start
                .saturating_sub(margin)
                .max(self.buffer.placeholders())
                .min(len.saturating_sub(1));
            if let Some(anchor) = self.buffer.item(pos) {
                let size = (self.end.saturating_sub(pos) + margin).max(min_size);
                let offset = offset.max(-(pos as i64));
                return ReloadPlan::Tail {
                    at: (pos as i64 + offset) as usize,
                    anchor: anchor.index(),
                    size,
                    offset,
                };
            }
        }
        ReloadPlan::Head {
            size: (width + 2 * margin).max(min_size),
        }
    }

    pub(crate) fn apply_reload_head(&mut self, items: Vec<T>, end_reached: bool) {
        let width = self.end - self.start;
        self.buffer.replace_all(items);
        self.start = 0;
        self.end = width;
        self.reached_start = true;
        self.head_known = true;
        self.reached_end = end_reached;
    }

    pub(crate) fn apply_reload_tail(&mut self, at: usize, items: Vec<T>, end_reached: bool) {
        let kept_tail = self.buffer.splice_reload(at, items, !end_reached);
        if at > 0 {
            self.reached_start = false;
        }
        self.reached_end = end_reached || (kept_tail && self.reached_end);
    }

    /// Commits a jump if `anchor` is part of `items`. Returns the anchor's position.
    ///
    /// A `None` anchor means "the very beginning" and lands on position 0. When the anchor is
    /// missing the buffer is left as it was.
    pub(crate) fn apply_jump(
        &mut self,
        anchor: Option<&T::Index>,
        size: usize,
        items: Vec<T>,
        end_reached: bool,
    ) -> Option<usize> {
        let pos = match anchor {
            None => 0,
            Some(anchor) => items.iter().position(|item| item.index() == *anchor)?,
        };
        self.buffer.replace_all(items);
        self.start = pos;
        self.end = pos + size;
        self.reached_start = false;
        self.head_known = false;
        self.reached_end = end_reached;
        Some(pos)
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use replacing_chunks::{ArrayEvent, ChunksArray, ListenerId, PendingTask, Record};

use crate::{RowAnchor, apply_anchor, capture_first_visible_anchor};

/// A scroll adjustment the UI has to apply to its scroll container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScrollCorrection {
    /// Rows were inserted above the window (positive) or removed from above it (negative):
    /// scroll by this many pixels.
    Shift(i64),
    /// The buffer was replaced: scroll to this absolute offset.
    ResetTo(u64),
}

#[derive(Debug, Default)]
struct ScrollState {
    scroll_offset: u64,
    /// Net head change in pixels since the last `take_scroll_correction`.
    shift: i64,
    reset: Option<PendingTask>,
}

/// A framework-neutral controller that wraps a [`ChunksArray`] and maps a pixel scroll offset,
/// with fixed-size rows, onto its window.
///
/// This type does not hold any UI objects. Adapters drive it by calling:
/// - `on_viewport_size` / `on_scroll` when UI events occur
/// - `take_scroll_correction` once per frame, before reporting the next scroll offset
///
/// Row `i` of the buffer starts at `i * row_size`. When the array grows its head, the window
/// and every loaded row move down; when it trims leftover placeholders off the head, they move
/// up. The controller applies the change to its scroll offset and hands the same amount to the
/// UI as a [`ScrollCorrection::Shift`].
#[derive(Debug)]
pub struct Controller<T: Record> {
    array: ChunksArray<T>,
    row_size: u32,
    viewport: u32,
    state: Arc<Mutex<ScrollState>>,
    listener: ListenerId,
}

impl<T: Record> Controller<T> {
    pub fn new(array: ChunksArray<T>, row_size: u32) -> Self {
        let row_size = row_size.max(1);
        let state = Arc::new(Mutex::new(ScrollState {
            scroll_offset: array.start() as u64 * u64::from(row_size),
            ..ScrollState::default()
        }));

        let shared = Arc::clone(&state);
        let listener = array.subscribe(move |event| match event {
            ArrayEvent::HeadAboutToChange { inserted, .. } => {
                let px = *inserted as u64 * u64::from(row_size);
                let mut state = shared.lock();
                state.scroll_offset = state.scroll_offset.saturating_add(px);
                state.shift = state.shift.saturating_add_unsigned(px);
            }
            ArrayEvent::HeadTrimmed { removed, .. } => {
                let px = *removed as u64 * u64::from(row_size);
                let mut state = shared.lock();
                state.scroll_offset = state.scroll_offset.saturating_sub(px);
                state.shift = state.shift.saturating_sub_unsigned(px);
            }
            ArrayEvent::FullResetStarted { pending } => {
                shared.lock().reset = Some(pending.clone());
            }
            _ => {}
        });

        Self {
            array,
            row_size,
            viewport: 0,
            state,
            listener,
        }
    }

    pub fn array(&self) -> &ChunksArray<T> {
        &self.array
    }

    pub fn into_array(self) -> ChunksArray<T> {
        self.array.unsubscribe(self.listener);
        self.array
    }

    pub fn row_size(&self) -> u32 {
        self.row_size
    }

    pub fn scroll_offset(&self) -> u64 {
        self.state.lock().scroll_offset
    }

    pub fn on_viewport_size(&mut self, viewport: u32) {
        self.viewport = viewport;
        self.sync_window();
    }

    /// Call this when the UI reports a scroll offset change (e.g. user wheel/drag).
    pub fn on_scroll(&mut self, scroll_offset: u64) {
        self.state.lock().scroll_offset = scroll_offset;
        self.sync_window();
    }

    /// Returns the correction the UI must apply since the previous call, if any.
    ///
    /// A finished reset wins over any pending shift: the scroll offset snaps to the new window
    /// start. A reset that is still running is reported on a later call.
    pub fn take_scroll_correction(&self) -> Option<ScrollCorrection> {
        let reset_done = {
            let mut state = self.state.lock();
            match &state.reset {
                Some(pending) if pending.is_settled() => {
                    state.reset = None;
                    true
                }
                _ => false,
            }
        };

        if reset_done {
            let offset = self.array.start() as u64 * u64::from(self.row_size);
            let mut state = self.state.lock();
            state.scroll_offset = offset;
            state.shift = 0;
            return Some(ScrollCorrection::ResetTo(offset));
        }

        let shift = core::mem::take(&mut self.state.lock().shift);
        (shift != 0).then_some(ScrollCorrection::Shift(shift))
    }

    pub fn capture_first_visible_anchor(&self) -> Option<RowAnchor<T::Id>> {
        capture_first_visible_anchor(&self.array)
    }

    /// Applies a previously captured anchor by moving the window, then aligns the scroll
    /// offset with the new window start (keeping the offset within the row).
    pub fn apply_anchor(&mut self, anchor: &RowAnchor<T::Id>) -> bool {
        if !apply_anchor(&self.array, anchor) {
            return false;
        }
        let row = u64::from(self.row_size);
        let start = self.array.start() as u64 * row;
        let mut state = self.state.lock();
        state.scroll_offset = start + state.scroll_offset % row;
        true
    }

    /// Visible rows for the current viewport, rounded up.
    fn rows_in_viewport(&self) -> usize {
        self.viewport.div_ceil(self.row_size) as usize
    }

    fn sync_window(&self) {
        let offset = self.state.lock().scroll_offset;
        let start = (offset / u64::from(self.row_size)) as usize;
        self.array.set_window(start, start + self.rows_in_viewport());
    }
}

/// A lightweight, serializable snapshot of an array's window bookkeeping.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`. It is meant for
/// debugging overlays and for asserting on state in adapter tests, not for restoring an array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowState {
    pub start: usize,
    pub end: usize, // exclusive
    pub buffer_len: usize,
    /// Number of placeholder slots at the head of the buffer.
    pub placeholders: usize,
    pub reached_start: bool,
    pub reached_end: bool,
    pub is_reloading: bool,
    pub initial_load_done: bool,
    pub has_error: bool,
}

impl WindowState {
    /// `empty_boundary` of the buffer: the last placeholder position, `None` without placeholders.
    pub fn empty_boundary(&self) -> Option<usize> {
        self.placeholders.checked_sub(1)
    }
}

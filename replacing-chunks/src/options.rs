use std::time::Duration;

/// Configuration for [`crate::ChunksArray`].
///
/// Immutable once the array is built. `I` is the record index type (see [`crate::Record`]).
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChunksArrayOptions<I> {
    /// Number of items requested per directional fetch.
    pub chunk_size: usize,

    /// Initial window start (buffer position).
    pub start_index: usize,
    /// Initial window end (buffer position, exclusive).
    pub end_index: usize,

    /// Rows kept as slack around a jump target or a reloaded window.
    pub index_margin: usize,

    /// How close (in rows) the window may get to an unfetched boundary before a prefetch
    /// starts. `None` means `chunk_size / 2`.
    pub load_more_threshold: Option<usize>,

    /// When set, the initial load is a jump to this anchor instead of a head reload.
    pub initial_jump_anchor: Option<I>,

    /// Upper bound for a single source call. Expiry rejects the task with
    /// [`crate::FetchError::TimedOut`].
    pub fetch_timeout: Option<Duration>,
}

impl<I> ChunksArrayOptions<I> {
    /// Creates options with a window covering the first chunk.
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            start_index: 0,
            end_index: chunk_size,
            index_margin: 0,
            load_more_threshold: None,
            initial_jump_anchor: None,
            fetch_timeout: None,
        }
    }

    pub fn with_window(mut self, start_index: usize, end_index: usize) -> Self {
        self.start_index = start_index;
        self.end_index = end_index.max(start_index);
        self
    }

    pub fn with_index_margin(mut self, index_margin: usize) -> Self {
        self.index_margin = index_margin;
        self
    }

    pub fn with_load_more_threshold(mut self, threshold: usize) -> Self {
        self.load_more_threshold = Some(threshold);
        self
    }

    pub fn with_initial_jump_anchor(mut self, anchor: Option<I>) -> Self {
        self.initial_jump_anchor = anchor;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn load_more_threshold(&self) -> usize {
        self.load_more_threshold.unwrap_or(self.chunk_size / 2)
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.max(1);
        self.end_index = self.end_index.max(self.start_index);
        self
    }
}

impl<I: core::fmt::Debug> core::fmt::Debug for ChunksArrayOptions<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunksArrayOptions")
            .field("chunk_size", &self.chunk_size)
            .field("start_index", &self.start_index)
            .field("end_index", &self.end_index)
            .field("index_margin", &self.index_margin)
            .field("load_more_threshold", &self.load_more_threshold())
            .field("initial_jump_anchor", &self.initial_jump_anchor)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

//! A windowed array over an unbounded, paginated async collection.
//!
//! For UI-side utilities (scroll compensation, anchoring), see the `replacing-chunks-adapter`
//! crate.
//!
//! [`ChunksArray`] holds a contiguous buffer of records fetched in chunks from a
//! [`ChunkSource`] and exposes a movable window over it. As the window approaches either end of
//! the buffer the array prefetches the next chunk; it can also reload around the current window
//! or jump to an arbitrary record.
//!
//! It is UI-agnostic. A list widget is expected to:
//! - move the window as the user scrolls ([`ChunksArray::set_window`])
//! - read the visible records ([`ChunksArray::with_view`], [`ChunksArray::to_vec`])
//! - compensate its scroll offset when the head changes size
//!   ([`ArrayEvent::HeadAboutToChange`], [`ArrayEvent::HeadTrimmed`])
//!
//! All source calls of one array are serialized through a single-flight task queue.
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod array;
mod buffer;
mod error;
mod events;
mod fetch;
mod key;
mod options;
mod queue;
mod state;
mod task;
mod types;
mod view;
mod window;

#[cfg(test)]
mod tests;

pub use array::ChunksArray;
pub use error::{BoxError, FetchError, TaskResult};
pub use events::{ArrayEvent, Listener, ListenerId};
pub use fetch::{ChunkSource, FnSource, source_fn};
pub use key::RecordKey;
pub use options::ChunksArrayOptions;
pub use state::WindowState;
pub use task::{FetchTask, PendingTask, ReloadOptions, TaskKind, TaskOutcome};
pub use types::{Direction, FetchReply, FetchRequest, Page, Record, Slot};
pub use view::WindowView;

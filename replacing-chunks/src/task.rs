use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::TaskResult;

/// Options of a [`FetchTask::Reload`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReloadOptions {
    /// Discard the whole buffer and reload from the beginning of the collection.
    pub head: bool,
    /// Minimum number of items to fetch (defaults to `chunk_size`).
    pub min_size: Option<usize>,
    /// Offset passed to the source along with the reload anchor.
    pub offset: i64,
}

impl ReloadOptions {
    pub fn head() -> Self {
        Self {
            head: true,
            ..Self::default()
        }
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = Some(min_size);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// A mutating operation on the array.
///
/// The value doubles as the coalescing key: scheduling a task equal to one that is already
/// queued or running hands back the existing [`PendingTask`].
#[derive(Clone, Debug, PartialEq)]
pub enum FetchTask<I> {
    FetchPrev,
    FetchNext,
    Reload(ReloadOptions),
    Jump { anchor: Option<I>, size: usize },
}

impl<I> FetchTask<I> {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::FetchPrev => TaskKind::FetchPrev,
            Self::FetchNext => TaskKind::FetchNext,
            Self::Reload(_) => TaskKind::Reload,
            Self::Jump { .. } => TaskKind::Jump,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskKind {
    FetchPrev,
    FetchNext,
    Reload,
    Jump,
}

impl TaskKind {
    /// `FetchPrev` and `FetchNext`.
    pub fn is_directional(self) -> bool {
        matches!(self, Self::FetchPrev | Self::FetchNext)
    }

    /// `Reload` and `Jump`: they replace the buffer, so directional fetches wait for them.
    pub fn is_exclusive(self) -> bool {
        !self.is_directional()
    }
}

/// How a task settled when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskOutcome {
    Completed,
    /// A directional fetch was requested while a reload or jump was pending. Nothing was fetched.
    Refused,
    /// A jump fetched a page that no longer contains its anchor. The buffer was left untouched.
    AnchorNotFound,
}

impl TaskOutcome {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A handle to a scheduled task. Cloneable; every clone resolves to the same result.
#[derive(Clone)]
#[must_use = "a pending task does nothing extra when dropped, but its result is lost"]
pub struct PendingTask {
    kind: TaskKind,
    inner: Shared<BoxFuture<'static, TaskResult>>,
}

impl PendingTask {
    pub(crate) fn new(kind: TaskKind, fut: impl Future<Output = TaskResult> + Send + 'static) -> Self {
        Self {
            kind,
            inner: fut.boxed().shared(),
        }
    }

    pub(crate) fn ready(kind: TaskKind, result: TaskResult) -> Self {
        Self::new(kind, futures::future::ready(result))
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Returns the result if the task already settled.
    pub fn result(&self) -> Option<TaskResult> {
        if let Some(result) = self.inner.peek() {
            return Some(result.clone());
        }
        self.inner.clone().now_or_never()
    }

    pub fn is_settled(&self) -> bool {
        self.result().is_some()
    }
}

impl Future for PendingTask {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("kind", &self.kind)
            .field("settled", &self.is_settled())
            .finish()
    }
}

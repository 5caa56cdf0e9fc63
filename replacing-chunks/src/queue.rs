use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::TaskResult;
use crate::{FetchError, FetchTask, PendingTask, TaskKind, TaskOutcome};

/// A queued task together with the sender that settles its [`PendingTask`].
pub(crate) struct Entry<I> {
    pub(crate) task: FetchTask<I>,
    pub(crate) pending: PendingTask,
    tx: oneshot::Sender<TaskResult>,
}

impl<I> Entry<I> {
    pub(crate) fn settle(self, result: TaskResult) {
        // The receiver lives inside `pending`; it is gone only once every clone was dropped.
        let _ = self.tx.send(result);
    }
}

struct Running<I> {
    task: FetchTask<I>,
    pending: PendingTask,
}

/// Result of offering a task to the queue.
pub(crate) enum Admission {
    /// An equal task is already queued or running.
    Coalesced(PendingTask),
    /// A directional task was offered while a reload or jump is pending.
    Refused(PendingTask),
    /// Queued. `start_drain` is set when no drain loop is active and the caller must start one.
    Enqueued {
        pending: PendingTask,
        start_drain: bool,
    },
}

impl Admission {
    #[cfg(test)]
    pub(crate) fn pending(&self) -> &PendingTask {
        match self {
            Self::Coalesced(pending) | Self::Refused(pending) => pending,
            Self::Enqueued { pending, .. } => pending,
        }
    }
}

/// Where a task goes when it is admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    Back,
    /// Before the first queued task of this kind.
    Before(TaskKind),
    /// Before the first queued reload or jump.
    BeforeExclusive,
}

/// Per-array single-flight queue.
///
/// Holds no executor: it only decides admission and order, and hands entries to the drain loop
/// through [`TaskQueue::pop`]. Exactly one drain loop exists while `draining` is set.
pub(crate) struct TaskQueue<I> {
    queued: VecDeque<Entry<I>>,
    running: Option<Running<I>>,
    draining: bool,
}

impl<I> Default for TaskQueue<I> {
    fn default() -> Self {
        Self {
            queued: VecDeque::new(),
            running: None,
            draining: false,
        }
    }
}

impl<I: PartialEq> TaskQueue<I> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        !self.draining
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queued.len() + usize::from(self.running.is_some())
    }

    pub(crate) fn running_kind(&self) -> Option<TaskKind> {
        self.running.as_ref().map(|r| r.task.kind())
    }

    #[cfg(test)]
    pub(crate) fn queued_kinds(&self) -> Vec<TaskKind> {
        self.queued.iter().map(|e| e.task.kind()).collect()
    }

    /// A reload or jump is queued or running.
    pub(crate) fn has_exclusive(&self) -> bool {
        self.running_kind().is_some_and(TaskKind::is_exclusive)
            || self.queued.iter().any(|e| e.task.kind().is_exclusive())
    }

    fn find(&self, task: &FetchTask<I>) -> Option<PendingTask> {
        if let Some(running) = self.running.as_ref().filter(|r| r.task == *task) {
            return Some(running.pending.clone());
        }
        self.queued
            .iter()
            .find(|e| e.task == *task)
            .map(|e| e.pending.clone())
    }

    /// Offers `task`. With `enforce_exclusive`, directional tasks are refused while a reload or
    /// jump is pending.
    pub(crate) fn admit(
        &mut self,
        task: FetchTask<I>,
        placement: Placement,
        enforce_exclusive: bool,
    ) -> Admission {
        let kind = task.kind();
        if let Some(existing) = self.find(&task) {
            return Admission::Coalesced(existing);
        }
        if enforce_exclusive && kind.is_directional() && self.has_exclusive() {
            return Admission::Refused(PendingTask::ready(kind, Ok(TaskOutcome::Refused)));
        }

        let (tx, rx) = oneshot::channel::<TaskResult>();
        let pending = PendingTask::new(kind, async move {
            rx.await.unwrap_or(Err(FetchError::Cancelled))
        });
        let entry = Entry {
            task,
            pending: pending.clone(),
            tx,
        };

        let at = match placement {
            Placement::Back => None,
            Placement::Before(kind) => self.queued.iter().position(|e| e.task.kind() == kind),
            Placement::BeforeExclusive => self
                .queued
                .iter()
                .position(|e| e.task.kind().is_exclusive()),
        };
        match at {
            Some(at) => self.queued.insert(at, entry),
            None => self.queued.push_back(entry),
        }

        let start_drain = !self.draining;
        self.draining = true;
        Admission::Enqueued {
            pending,
            start_drain,
        }
    }

    /// Takes the next task and marks it running. Returns `None` (and stops draining) when the
    /// queue is empty.
    pub(crate) fn pop(&mut self) -> Option<Entry<I>>
    where
        I: Clone,
    {
        debug_assert!(self.running.is_none(), "TaskQueue: pop while a task is running");
        let Some(entry) = self.queued.pop_front() else {
            self.draining = false;
            return None;
        };
        self.running = Some(Running {
            task: entry.task.clone(),
            pending: entry.pending.clone(),
        });
        Some(entry)
    }

    /// Clears the running slot once its task settled.
    pub(crate) fn finish(&mut self) {
        self.running = None;
    }

    /// Removes every queued (not running) entry.
    pub(crate) fn drain_queued(&mut self) -> Vec<Entry<I>> {
        self.queued.drain(..).collect()
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TaskResult;
use crate::events::{self, Listeners};
use crate::fetch::{Chunk, FetchAdapter};
use crate::queue::{Admission, Placement, TaskQueue};
use crate::window::{ReloadPlan, Window};
use crate::{
    ArrayEvent, ChunkSource, ChunksArrayOptions, Direction, FetchError, FetchTask, ListenerId,
    PendingTask, Record, ReloadOptions, TaskKind, TaskOutcome, WindowState, WindowView,
};

/// A windowed view over an unbounded, paginated collection.
///
/// The array keeps a contiguous buffer of records fetched from a [`ChunkSource`] and exposes
/// the slice between `start` and `end`. Moving the window (see [`ChunksArray::set_window`])
/// prefetches whatever the window is about to need; at most one source fetch is in flight at a
/// time.
///
/// All methods are synchronous except the ones returning a [`PendingTask`] (which runs in the
/// background) and [`ChunksArray::settled`]. Dropping the array cancels outstanding work.
pub struct ChunksArray<T: Record> {
    inner: Arc<Inner<T>>,
    initial_load: PendingTask,
}

struct Inner<T: Record> {
    options: ChunksArrayOptions<T::Index>,
    adapter: FetchAdapter<T>,
    window: Mutex<Window<T>>,
    queue: Mutex<TaskQueue<T::Index>>,
    listeners: Mutex<Listeners>,
    cancel: CancellationToken,
    runtime: Handle,
    idle: watch::Sender<bool>,
}

impl<T: Record> ChunksArray<T> {
    /// Creates the array and schedules its initial load: a jump to
    /// [`ChunksArrayOptions::initial_jump_anchor`] when set, a head reload otherwise.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. Background fetches run on the runtime that
    /// was current at construction.
    pub fn new(source: impl ChunkSource<T>, options: ChunksArrayOptions<T::Index>) -> Self {
        Self::with_source(Arc::new(source), options)
    }

    /// Like [`ChunksArray::new`], for a source that is already shared.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_source(
        source: Arc<dyn ChunkSource<T>>,
        options: ChunksArrayOptions<T::Index>,
    ) -> Self {
        let options = options.normalized();
        let cancel = CancellationToken::new();
        let (idle, _) = watch::channel(true);
        rdebug!(options = ?options, "ChunksArray::new");

        let initial = match options.initial_jump_anchor.clone() {
            Some(anchor) => FetchTask::Jump {
                anchor: Some(anchor),
                size: options.end_index - options.start_index,
            },
            None => FetchTask::Reload(ReloadOptions::head()),
        };

        let inner = Arc::new(Inner {
            adapter: FetchAdapter::new(source, options.fetch_timeout, cancel.clone()),
            window: Mutex::new(Window::new(options.start_index, options.end_index)),
            queue: Mutex::new(TaskQueue::new()),
            listeners: Mutex::new(Listeners::default()),
            cancel,
            runtime: Handle::current(),
            idle,
            options,
        });
        let initial_load = inner.schedule(initial, Placement::Back, true);
        Self {
            inner,
            initial_load,
        }
    }

    pub fn options(&self) -> &ChunksArrayOptions<T::Index> {
        &self.inner.options
    }

    // --- window ---

    pub fn start(&self) -> usize {
        self.inner.window.lock().start()
    }

    pub fn end(&self) -> usize {
        self.inner.window.lock().end()
    }

    /// Moves the window to buffer positions `start..end` and prefetches what it needs.
    ///
    /// `end` is clamped to `>= start`. The window may extend past the loaded buffer; the view
    /// only ever exposes loaded records.
    pub fn set_window(&self, start: usize, end: usize) {
        {
            let mut window = self.inner.window.lock();
            if window.start() == start && window.end() == end.max(start) {
                return;
            }
            window.set_bounds(start, end);
        }
        rtrace!(start, end, "set_window");
        self.inner.check_needs();
    }

    pub fn set_start(&self, start: usize) {
        let end = self.end().max(start);
        self.set_window(start, end);
    }

    pub fn set_end(&self, end: usize) {
        let start = self.start().min(end);
        self.set_window(start, end);
    }

    // --- view ---

    /// Number of records in the visible slice.
    pub fn len(&self) -> usize {
        self.inner.window.lock().visible_range().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at slice index `i`.
    pub fn object_at(&self, i: usize) -> Option<T> {
        self.inner.window.lock().view().object_at(i).cloned()
    }

    pub fn first_item(&self) -> Option<T> {
        self.inner.window.lock().view().first().cloned()
    }

    pub fn last_item(&self) -> Option<T> {
        self.inner.window.lock().view().last().cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.window.lock().view().to_vec()
    }

    /// Runs `f` over the visible slice without cloning it.
    ///
    /// The state lock is held while `f` runs: `f` must not call back into the array.
    pub fn with_view<R>(&self, f: impl FnOnce(&WindowView<'_, T>) -> R) -> R {
        let window = self.inner.window.lock();
        f(&window.view())
    }

    pub fn state(&self) -> WindowState {
        self.inner.window.lock().state()
    }

    /// Total buffer length, placeholders included.
    pub fn buffer_len(&self) -> usize {
        self.inner.window.lock().buffer.len()
    }

    pub fn reached_start(&self) -> bool {
        self.inner.window.lock().reached_start()
    }

    pub fn reached_end(&self) -> bool {
        self.inner.window.lock().reached_end()
    }

    pub fn is_reloading(&self) -> bool {
        self.inner.window.lock().is_reloading()
    }

    /// The last fetch failure, cleared by the next successful fetch.
    pub fn error(&self) -> Option<FetchError> {
        self.inner.window.lock().error().cloned()
    }

    /// Buffer position of the record with identity `id`.
    pub fn position_of(&self, id: &T::Id) -> Option<usize> {
        self.inner.window.lock().buffer.position_of_id(id)
    }

    /// Buffer position of the record whose index is `index`.
    pub fn position_of_index(&self, index: &T::Index) -> Option<usize> {
        self.inner.window.lock().buffer.position_of_index(index)
    }

    // --- tasks ---

    pub fn fetch_prev(&self) -> PendingTask {
        self.schedule(FetchTask::FetchPrev)
    }

    pub fn fetch_next(&self) -> PendingTask {
        self.schedule(FetchTask::FetchNext)
    }

    pub fn reload(&self, options: ReloadOptions) -> PendingTask {
        self.schedule(FetchTask::Reload(options))
    }

    /// Replaces the buffer with `size` records starting at `anchor` (plus the configured
    /// margin on both sides). Resolves to [`TaskOutcome::AnchorNotFound`] and leaves the
    /// buffer untouched when the source does not return `anchor`.
    pub fn jump(&self, anchor: Option<T::Index>, size: usize) -> PendingTask {
        self.schedule(FetchTask::Jump { anchor, size })
    }

    /// Queues `task` behind the ones already queued.
    ///
    /// A task equal to a queued or running one shares its [`PendingTask`]. Directional tasks
    /// resolve to [`TaskOutcome::Refused`] while a reload or jump is pending.
    pub fn schedule(&self, task: FetchTask<T::Index>) -> PendingTask {
        self.inner.schedule(task, Placement::Back, true)
    }

    /// Queues `task` before the first queued task of kind `insert_before` (at the back when
    /// `None` or when no such task is queued). Never refuses.
    pub fn force_schedule(
        &self,
        task: FetchTask<T::Index>,
        insert_before: Option<TaskKind>,
    ) -> PendingTask {
        let placement = insert_before.map_or(Placement::Back, Placement::Before);
        self.inner.schedule(task, placement, false)
    }

    // --- lifecycle ---

    /// The task scheduled at construction.
    pub fn initial_load(&self) -> PendingTask {
        self.initial_load.clone()
    }

    pub fn initial_load_done(&self) -> bool {
        self.inner.window.lock().initial_load_done()
    }

    pub async fn wait_initial_load(&self) -> TaskResult {
        self.initial_load.clone().await
    }

    /// Resolves once no task is queued or running (including the follow-up fetches the array
    /// schedules for itself).
    pub async fn settled(&self) {
        let mut rx = self.inner.idle.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    pub fn subscribe(&self, listener: impl Fn(&ArrayEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.lock().add(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(id)
    }

    /// Cancels outstanding work. Queued tasks resolve to [`FetchError::Cancelled`]; a running
    /// fetch is abandoned and its result discarded. Idempotent.
    pub fn destroy(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        rdebug!("ChunksArray::destroy");
        self.inner.cancel.cancel();
        let entries = self.inner.queue.lock().drain_queued();
        for entry in entries {
            entry.settle(Err(FetchError::Cancelled));
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl<T: Record> Drop for ChunksArray<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T: Record> core::fmt::Debug for ChunksArray<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunksArray")
            .field("options", &self.inner.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Record> Inner<T> {
    fn threshold(&self) -> usize {
        self.options.load_more_threshold()
    }

    fn emit(&self, event: ArrayEvent) {
        events::emit(&self.listeners, event);
    }

    fn schedule(
        self: &Arc<Self>,
        task: FetchTask<T::Index>,
        placement: Placement,
        enforce_exclusive: bool,
    ) -> PendingTask {
        let kind = task.kind();
        if self.cancel.is_cancelled() {
            return PendingTask::ready(kind, Err(FetchError::Cancelled));
        }

        let admission = {
            let mut queue = self.queue.lock();
            let admission = queue.admit(task, placement, enforce_exclusive);
            if let Admission::Enqueued {
                start_drain: true, ..
            } = admission
            {
                self.idle.send_replace(false);
            }
            admission
        };

        match admission {
            Admission::Coalesced(pending) => {
                rtrace!(kind = ?kind, "coalesced with a pending task");
                pending
            }
            Admission::Refused(pending) => {
                rdebug!(kind = ?kind, "refused: a reload or jump is pending");
                pending
            }
            Admission::Enqueued {
                pending,
                start_drain,
            } => {
                rtrace!(kind = ?kind, start_drain, "enqueued");
                if start_drain {
                    self.runtime.spawn(Arc::clone(self).drain());
                }
                pending
            }
        }
    }

    /// Schedules whichever directional fetch the current window needs.
    fn check_needs(self: &Arc<Self>) {
        let threshold = self.threshold();
        let (backward, forward) = {
            let window = self.window.lock();
            (
                window.backward_needed(threshold),
                window.forward_needed(threshold),
            )
        };
        if backward {
            let _ = self.schedule(FetchTask::FetchPrev, Placement::Back, true);
        }
        if forward {
            let _ = self.schedule(FetchTask::FetchNext, Placement::Back, true);
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let entry = {
                let mut queue = self.queue.lock();
                let entry = queue.pop();
                if entry.is_none() {
                    self.idle.send_replace(true);
                }
                entry
            };
            let Some(entry) = entry else {
                return;
            };

            let task = entry.task.clone();
            rtrace!(task = ?task, "task started");
            let result = if self.cancel.is_cancelled() {
                Err(FetchError::Cancelled)
            } else {
                self.run(&task, &entry.pending).await
            };
            rtrace!(task = ?task, result = ?result, "task settled");

            self.queue.lock().finish();
            entry.settle(result.clone());
            self.after_settle(&task, &result).await;
        }
    }

    async fn after_settle(self: &Arc<Self>, task: &FetchTask<T::Index>, result: &TaskResult) {
        if self.cancel.is_cancelled() {
            return;
        }
        match task.kind() {
            TaskKind::FetchPrev => {
                if !matches!(result, Ok(TaskOutcome::Completed)) {
                    return;
                }
                // Let consumers render the grown head before asking for more.
                tokio::task::yield_now().await;
                if self.cancel.is_cancelled() {
                    return;
                }
                let needed = self.window.lock().backward_needed(self.threshold());
                if needed {
                    let _ = self.schedule(FetchTask::FetchPrev, Placement::BeforeExclusive, false);
                }
            }
            TaskKind::FetchNext => {
                if matches!(result, Ok(TaskOutcome::Completed)) {
                    self.check_needs();
                }
            }
            // Directional fetches refused while this task was pending are re-evaluated here.
            TaskKind::Reload | TaskKind::Jump => {
                if result.is_ok() {
                    self.check_needs();
                }
            }
        }
    }

    async fn run(&self, task: &FetchTask<T::Index>, pending: &PendingTask) -> TaskResult {
        match task {
            FetchTask::FetchPrev => self.run_fetch_prev(pending).await,
            FetchTask::FetchNext => self.run_fetch_next().await,
            FetchTask::Reload(options) => self.run_reload(*options, pending).await,
            FetchTask::Jump { anchor, size } => self.run_jump(anchor.clone(), *size, pending).await,
        }
    }

    /// Records a failed directional fetch and tells subscribers.
    fn reject(&self, direction: Direction, err: FetchError) -> FetchError {
        if err.is_cancelled() {
            rdebug!(direction = ?direction, "fetch cancelled");
            return err;
        }
        rdebug!(direction = ?direction, error = %err, "fetch rejected");
        self.window.lock().record_error(err.clone());
        self.emit(ArrayEvent::FetchRejected(direction, err.clone()));
        err
    }

    /// Drops a fetched chunk when the array was destroyed while it was in flight.
    fn unless_cancelled(&self, chunk: Chunk<T>) -> Result<Chunk<T>, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(chunk)
    }

    async fn run_fetch_prev(&self, pending: &PendingTask) -> TaskResult {
        let plan = self.window.lock().plan_prev(self.options.chunk_size);
        self.emit(ArrayEvent::FetchStarted(Direction::Backward));

        let mut chunk = match self
            .adapter
            .fetch_chunk(plan.anchor, plan.size, plan.offset)
            .await
            .and_then(|chunk| self.unless_cancelled(chunk))
        {
            Ok(chunk) => chunk,
            Err(err) => return Err(self.reject(Direction::Backward, err)),
        };

        let (inserted, removed) = {
            let window = self.window.lock();
            let dropped = chunk.retain_new(&window.buffer);
            if dropped > 0 {
                rtrace!(dropped, "backward batch overlapped the buffer");
            }
            let fetched = chunk.items.len();
            (
                window.prev_growth(fetched),
                window.prev_trim(fetched, chunk.end_reached),
            )
        };
        if inserted > 0 {
            self.emit(ArrayEvent::HeadAboutToChange {
                pending: pending.clone(),
                inserted,
            });
        }
        if removed > 0 {
            self.emit(ArrayEvent::HeadTrimmed {
                pending: pending.clone(),
                removed,
            });
        }

        {
            let mut window = self.window.lock();
            let applied = window.apply_prev(chunk.items, chunk.end_reached);
            debug_assert_eq!(
                applied,
                (inserted, removed),
                "head change differs between plan and apply"
            );
            window.clear_error();
        }
        self.emit(ArrayEvent::FetchResolved(Direction::Backward));
        Ok(TaskOutcome::Completed)
    }

    async fn run_fetch_next(&self) -> TaskResult {
        let plan = self.window.lock().plan_next(self.options.chunk_size);
        self.emit(ArrayEvent::FetchStarted(Direction::Forward));

        let mut chunk = match self
            .adapter
            .fetch_chunk(plan.anchor, plan.size, plan.offset)
            .await
            .and_then(|chunk| self.unless_cancelled(chunk))
        {
            Ok(chunk) => chunk,
            Err(err) => return Err(self.reject(Direction::Forward, err)),
        };

        {
            let mut window = self.window.lock();
            let dropped = chunk.retain_new(&window.buffer);
            if dropped > 0 {
                rtrace!(dropped, "forward batch overlapped the buffer");
            }
            window.apply_next(chunk.items, chunk.end_reached);
            window.clear_error();
        }
        self.emit(ArrayEvent::FetchResolved(Direction::Forward));
        Ok(TaskOutcome::Completed)
    }

    async fn run_reload(&self, options: ReloadOptions, pending: &PendingTask) -> TaskResult {
        let min_size = options.min_size.unwrap_or(self.options.chunk_size);
        let plan = {
            let mut window = self.window.lock();
            window.set_reloading(true);
            window.plan_reload(
                options.head,
                min_size,
                self.options.index_margin,
                options.offset,
            )
        };
        rdebug!(plan = ?plan, "reload");

        let result = match plan {
            ReloadPlan::Head { size } => {
                self.emit(ArrayEvent::FullResetStarted {
                    pending: pending.clone(),
                });
                self.adapter
                    .fetch_chunk(None, size, options.offset)
                    .await
                    .and_then(|chunk| self.unless_cancelled(chunk))
                    .map(|chunk| {
                        self.window
                            .lock()
                            .apply_reload_head(chunk.items, chunk.end_reached);
                    })
            }
            ReloadPlan::Tail {
                at,
                anchor,
                size,
                offset,
            } => self
                .adapter
                .fetch_chunk(Some(anchor), size, offset)
                .await
                .and_then(|chunk| self.unless_cancelled(chunk))
                .map(|chunk| {
                    self.window
                        .lock()
                        .apply_reload_tail(at, chunk.items, chunk.end_reached);
                }),
        };

        let mut window = self.window.lock();
        window.set_reloading(false);
        window.mark_initial_load_done();
        match result {
            Ok(()) => {
                window.clear_error();
                Ok(TaskOutcome::Completed)
            }
            Err(err) => {
                if !err.is_cancelled() {
                    rdebug!(error = %err, "reload failed");
                    window.record_error(err.clone());
                }
                Err(err)
            }
        }
    }

    async fn run_jump(
        &self,
        anchor: Option<T::Index>,
        size: usize,
        pending: &PendingTask,
    ) -> TaskResult {
        let margin = self.options.index_margin;
        self.emit(ArrayEvent::FullResetStarted {
            pending: pending.clone(),
        });
        rdebug!(anchor = ?anchor, size, margin, "jump");

        let fetched = self
            .adapter
            .fetch_chunk(anchor.clone(), size + 2 * margin, -(margin as i64))
            .await
            .and_then(|chunk| self.unless_cancelled(chunk));

        let mut window = self.window.lock();
        window.mark_initial_load_done();
        let chunk = match fetched {
            Ok(chunk) => chunk,
            Err(err) => {
                if !err.is_cancelled() {
                    rdebug!(error = %err, "jump failed");
                    window.record_error(err.clone());
                }
                return Err(err);
            }
        };

        match window.apply_jump(anchor.as_ref(), size, chunk.items, chunk.end_reached) {
            Some(_pos) => {
                window.clear_error();
                rtrace!(pos = _pos, "jump committed");
                Ok(TaskOutcome::Completed)
            }
            None => {
                rdebug!(anchor = ?anchor, "jump anchor not in the fetched chunk");
                Ok(TaskOutcome::AnchorNotFound)
            }
        }
    }
}

use crate::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::buffer::Buffer;
use crate::fetch::FetchAdapter;
use crate::queue::{Admission, Placement, TaskQueue};
use crate::window::{ReloadPlan, Window};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Row(u32);

impl Record for Row {
    type Index = u32;
    type Id = u32;

    fn index(&self) -> u32 {
        self.0
    }

    fn id(&self) -> u32 {
        self.0
    }
}

type Call = (Option<u32>, usize, i64);

/// In-memory backend over rows `0..len` that records every request.
#[derive(Clone, Default)]
struct VecSource {
    len: u32,
    /// Caps every reply to this many rows (the ones closest to the anchor).
    cap: Option<usize>,
    /// Rows below this index were deleted from the backend.
    first: Arc<AtomicU32>,
    calls: Arc<Mutex<Vec<Call>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
}

impl VecSource {
    fn new(len: u32) -> Self {
        Self {
            len,
            ..Self::default()
        }
    }

    fn with_cap(mut self, cap: usize) -> Self {
        self.cap = Some(cap);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChunkSource<Row> for VecSource {
    async fn fetch(&self, request: FetchRequest<u32>) -> Result<FetchReply<Row>, BoxError> {
        self.calls
            .lock()
            .push((request.anchor, request.size, request.offset));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err("backend down".into());
        }

        let len = i64::from(self.len);
        let first = i64::from(self.first.load(Ordering::SeqCst)).min(len);
        let base = request.anchor.map_or(0, i64::from);
        let from = (base + request.offset).clamp(first, len);
        let to = (base + request.offset + request.size as i64).clamp(first, len);
        let mut rows: Vec<Row> = (from..to).map(|i| Row(i as u32)).collect();
        let Some(cap) = self.cap else {
            return Ok(rows.into());
        };

        // Capped replies are short pages that say whether more data exists.
        let backward = request.offset < 0 && request.offset + request.size as i64 <= 0;
        if rows.len() > cap {
            rows = if backward {
                rows.split_off(rows.len() - cap)
            } else {
                rows.into_iter().take(cap).collect()
            };
        }
        let is_last = if backward {
            rows.first().is_none_or(|row| row.0 == 0)
        } else {
            rows.last().is_none_or(|row| row.0 + 1 >= self.len)
        };
        Ok(Page { items: rows, is_last }.into())
    }
}

fn rows(range: core::ops::Range<u32>) -> Vec<Row> {
    range.map(Row).collect()
}

fn indices(array: &ChunksArray<Row>) -> Vec<u32> {
    array.to_vec().into_iter().map(|row| row.0).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn attach(&self, array: &ChunksArray<Row>) {
        let log = Arc::clone(&self.0);
        array.subscribe(move |event| {
            let entry = match event {
                ArrayEvent::HeadAboutToChange { pending, inserted } => {
                    format!("head+{inserted} settled={}", pending.is_settled())
                }
                ArrayEvent::HeadTrimmed { pending, removed } => {
                    format!("head-{removed} settled={}", pending.is_settled())
                }
                ArrayEvent::FetchStarted(dir) => format!("started {dir:?}"),
                ArrayEvent::FetchResolved(dir) => format!("resolved {dir:?}"),
                ArrayEvent::FetchRejected(dir, _) => format!("rejected {dir:?}"),
                ArrayEvent::FullResetStarted { .. } => "reset".to_string(),
            };
            log.lock().push(entry);
        });
    }

    fn take(&self) -> Vec<String> {
        core::mem::take(&mut *self.0.lock())
    }
}

// --- buffer ---

#[test]
fn buffer_prepend_fills_placeholders_before_growing() {
    let mut buffer = Buffer::<Row>::new();
    buffer.splice_reload(3, rows(10..15), true);
    assert_eq!(buffer.len(), 8);
    assert_eq!(buffer.placeholders(), 3);
    assert_eq!(buffer.first_item(), Some(&Row(10)));

    // Fits into the placeholders: no growth.
    assert_eq!(buffer.prepend(rows(8..10)), 0);
    assert_eq!(buffer.placeholders(), 1);
    assert_eq!(buffer.len(), 8);
    assert_eq!(buffer.first_item(), Some(&Row(8)));

    // Needs two more slots than there are placeholders.
    assert_eq!(buffer.prepend(rows(5..8)), 2);
    assert_eq!(buffer.placeholders(), 0);
    assert_eq!(buffer.len(), 10);
    assert_eq!(buffer.item(0), Some(&Row(5)));
    assert_eq!(buffer.position_of_id(&14), Some(9));
}

#[test]
fn buffer_splice_reload_keeps_uncovered_tail_without_duplicates() {
    let mut buffer = Buffer::<Row>::new();
    buffer.push_back(rows(0..10));

    // Overwrite from position 4 with rows that overlap the old tail.
    buffer.splice_reload(4, vec![Row(4), Row(5), Row(8)], true);
    let filled: Vec<u32> = buffer
        .slots()
        .iter()
        .filter_map(Slot::as_item)
        .map(|row| row.0)
        .collect();
    assert_eq!(buffer.placeholders(), 4);
    // Only what follows the reloaded range survives: 6 and 7 are gone from the backend.
    assert_eq!(filled, vec![4, 5, 8, 9]);

    buffer.splice_reload(0, rows(0..3), false);
    assert_eq!(buffer.len(), 3);
    assert!(!buffer.contains_id(&9));
}

#[test]
fn buffer_trim_and_retain_new() {
    let mut buffer = Buffer::<Row>::new();
    buffer.splice_reload(2, rows(2..4), true);
    assert_eq!(buffer.trim_placeholders(), 2);
    assert_eq!(buffer.trim_placeholders(), 0);
    assert_eq!(buffer.first_item(), Some(&Row(2)));

    let mut batch = rows(1..5);
    assert_eq!(buffer.retain_new(&mut batch), 2);
    assert_eq!(batch, vec![Row(1), Row(4)]);
}

// --- window ---

#[test]
fn window_never_exposes_placeholders() {
    let mut window = Window::<Row>::new(0, 6);
    window.buffer.splice_reload(4, rows(4..10), true);
    assert_eq!(window.visible_range(), 4..6);

    window.set_bounds(2, 100);
    let view = window.view();
    assert_eq!(view.buffer_offset(), 4);
    assert_eq!(view.first(), Some(&Row(4)));
    assert_eq!(view.last(), Some(&Row(9)));

    window.set_bounds(50, 60);
    assert!(window.view().is_empty());
}

#[test]
fn window_backward_need_is_gated_by_reached_start() {
    let mut window = Window::<Row>::new(0, 10);
    assert!(window.backward_needed(5));

    window.apply_reload_head(Vec::new(), true);
    assert!(window.reached_start());
    assert!(!window.backward_needed(5));
    assert!(!window.forward_needed(5));
}

#[test]
fn window_backward_fetch_is_limited_to_known_placeholders() {
    let mut window = Window::<Row>::new(0, 10);
    window.apply_reload_head(rows(0..30), false);
    window.set_bounds(20, 30);
    window.apply_reload_tail(18, rows(18..30), false);
    assert_eq!(window.buffer.placeholders(), 18);

    let plan = window.plan_prev(10);
    assert_eq!((plan.anchor, plan.size, plan.offset), (Some(18), 10, -10));
    assert_eq!(window.apply_prev(rows(8..18), false), (0, 0));

    let plan = window.plan_prev(10);
    assert_eq!((plan.anchor, plan.size, plan.offset), (Some(8), 8, -8));
    assert_eq!(window.prev_growth(8), 0);
}

#[test]
fn window_tail_reload_places_the_reply_at_its_offset() {
    let mut window = Window::<Row>::new(0, 10);
    window.apply_reload_head(rows(0..30), false);
    window.set_bounds(12, 22);
    assert_eq!(
        window.plan_reload(false, 10, 0, -4),
        ReloadPlan::Tail {
            at: 8,
            anchor: 12,
            size: 10,
            offset: -4,
        }
    );

    // An offset reaching past the head is clamped to it.
    window.set_bounds(3, 13);
    assert_eq!(
        window.plan_reload(false, 10, 0, -8),
        ReloadPlan::Tail {
            at: 0,
            anchor: 3,
            size: 10,
            offset: -3,
        }
    );

    window.apply_reload_tail(8, rows(8..18), false);
    assert_eq!(window.buffer.placeholders(), 8);
    assert_eq!(window.buffer.len(), 30);
    for i in 8..30 {
        assert_eq!(window.buffer.position_of_index(&i), Some(i as usize));
    }
}

#[test]
fn window_backward_fetch_reports_trimmed_placeholders() {
    let mut window = Window::<Row>::new(0, 10);
    window.apply_reload_head(rows(0..30), false);
    window.set_bounds(15, 25);
    window.apply_reload_tail(15, rows(15..25), false);

    assert_eq!(window.prev_trim(2, false), 0);
    assert_eq!(window.prev_trim(2, true), 13);
    assert_eq!(window.apply_prev(rows(13..15), true), (0, 13));
    assert_eq!((window.start(), window.end()), (2, 12));
    assert_eq!(window.buffer.placeholders(), 0);
    assert!(window.reached_start());
}

// --- queue ---

#[test]
fn queue_coalesces_equal_tasks_and_refuses_directional_during_reload() {
    let mut queue = TaskQueue::<u32>::new();
    let first = queue.admit(FetchTask::FetchNext, Placement::Back, true);
    assert!(matches!(
        first,
        Admission::Enqueued {
            start_drain: true,
            ..
        }
    ));
    assert!(matches!(
        queue.admit(FetchTask::FetchNext, Placement::Back, true),
        Admission::Coalesced(_)
    ));

    let reload = queue.admit(FetchTask::Reload(ReloadOptions::head()), Placement::Back, true);
    assert!(matches!(
        reload,
        Admission::Enqueued {
            start_drain: false,
            ..
        }
    ));
    assert!(matches!(
        queue.admit(FetchTask::FetchPrev, Placement::Back, true),
        Admission::Refused(_)
    ));
    assert!(matches!(
        queue.admit(FetchTask::FetchPrev, Placement::BeforeExclusive, false),
        Admission::Enqueued { .. }
    ));
    assert_eq!(
        queue.queued_kinds(),
        vec![TaskKind::FetchNext, TaskKind::FetchPrev, TaskKind::Reload]
    );
    assert_eq!(queue.len(), 3);
}

#[test]
fn queue_pop_runs_one_at_a_time_and_stops_draining_when_empty() {
    let mut queue = TaskQueue::<u32>::new();
    let _ = queue.admit(FetchTask::FetchPrev, Placement::Back, true);
    let _ = queue.admit(
        FetchTask::Jump {
            anchor: Some(7),
            size: 3,
        },
        Placement::Back,
        true,
    );
    assert!(!queue.is_idle());

    let entry = queue.pop().map(|e| e.task.clone());
    assert_eq!(entry, Some(FetchTask::FetchPrev));
    assert_eq!(queue.running_kind(), Some(TaskKind::FetchPrev));
    // The queued jump still refuses directional work.
    assert!(matches!(
        queue.admit(FetchTask::FetchNext, Placement::Back, true),
        Admission::Refused(_)
    ));
    queue.finish();

    let entry = queue.pop();
    assert_eq!(entry.as_ref().map(|e| e.task.kind()), Some(TaskKind::Jump));
    queue.finish();
    assert!(queue.pop().is_none());
    assert!(queue.is_idle());
}

#[tokio::test]
async fn settling_an_entry_resolves_every_clone() {
    let mut queue = TaskQueue::<u32>::new();
    let a = queue
        .admit(FetchTask::FetchNext, Placement::Back, true)
        .pending()
        .clone();
    let b = queue
        .admit(FetchTask::FetchNext, Placement::Back, true)
        .pending()
        .clone();
    let entry = queue.pop();
    assert!(entry.is_some());
    if let Some(entry) = entry {
        entry.settle(Ok(TaskOutcome::Completed));
    }
    assert!(matches!(a.await, Ok(TaskOutcome::Completed)));
    assert!(matches!(b.await, Ok(TaskOutcome::Completed)));
}

#[tokio::test]
async fn dropped_entry_resolves_cancelled() {
    let mut queue = TaskQueue::<u32>::new();
    let pending = queue
        .admit(FetchTask::FetchNext, Placement::Back, true)
        .pending()
        .clone();
    drop(queue.drain_queued());
    assert!(matches!(pending.await, Err(FetchError::Cancelled)));
}

// --- fetch adapter ---

fn adapter(source: VecSource) -> FetchAdapter<Row> {
    FetchAdapter::new(Arc::new(source), None, CancellationToken::new())
}

#[tokio::test]
async fn adapter_loops_forward_over_short_replies() {
    let source = VecSource::new(1000).with_cap(1);
    let chunk = adapter(source.clone())
        .fetch_chunk(None, 10, 0)
        .await
        .map_err(|err| err.to_string());
    let chunk = chunk.as_ref().map(|c| (c.items.clone(), c.end_reached));
    assert_eq!(chunk, Ok((rows(0..10), false)));

    let calls = source.calls();
    assert_eq!(calls.len(), 10);
    assert_eq!(calls[0], (None, 10, 0));
    assert_eq!(calls[1], (Some(0), 9, 1));
    assert_eq!(calls[9], (Some(8), 1, 1));
}

#[tokio::test]
async fn adapter_loops_backward_from_first_collected_item() {
    let source = VecSource::new(1000).with_cap(3);
    let chunk = adapter(source.clone()).fetch_chunk(Some(50), 10, -10).await;
    let items = chunk.map(|c| c.items).unwrap_or_default();
    assert_eq!(items, rows(40..50));
    assert_eq!(
        source.calls(),
        vec![
            (Some(50), 10, -10),
            (Some(47), 7, -7),
            (Some(44), 4, -4),
            (Some(41), 1, -1),
        ]
    );
}

#[tokio::test]
async fn adapter_stops_at_end_of_data() {
    let source = VecSource::new(1000).with_cap(2);
    let chunk = adapter(source.clone()).fetch_chunk(Some(995), 10, 1).await;
    let (items, end) = chunk
        .map(|c| (c.items, c.end_reached))
        .unwrap_or_default();
    assert_eq!(items, rows(996..1000));
    assert!(end);
    assert_eq!(
        source.calls(),
        vec![(Some(995), 10, 1), (Some(997), 8, 1)]
    );
}

#[tokio::test]
async fn adapter_treats_unrecognized_reply_as_empty_terminal_result() {
    let source = source_fn(|_request: FetchRequest<u32>| async {
        Ok::<_, BoxError>(FetchReply::<Row>::Unrecognized("{\"rows\":[]}".into()))
    });
    let adapter = FetchAdapter::<Row>::new(Arc::new(source), None, CancellationToken::new());
    let chunk = adapter.fetch_chunk(None, 10, 0).await;
    assert!(matches!(chunk, Ok(ref c) if c.items.is_empty() && c.end_reached));
}

#[tokio::test]
async fn adapter_uses_explicit_page_end() {
    let source = source_fn(|request: FetchRequest<u32>| async move {
        let from = request.anchor.map_or(0, |a| a + 1);
        Ok::<_, BoxError>(FetchReply::Page(Page {
            items: rows(from..from + 2),
            is_last: from >= 4,
        }))
    });
    let adapter = FetchAdapter::<Row>::new(Arc::new(source), None, CancellationToken::new());
    let chunk = adapter.fetch_chunk(None, 10, 0).await;
    let (items, end) = chunk
        .map(|c| (c.items, c.end_reached))
        .unwrap_or_default();
    assert_eq!(items, rows(0..6));
    assert!(end);
}

#[cfg(feature = "serde")]
#[test]
fn reply_from_json_accepts_lists_and_pages() {
    use serde_json::json;

    assert_eq!(
        FetchReply::<u32>::from_json(json!([1, 2, 3])),
        FetchReply::Items(vec![1, 2, 3])
    );
    assert_eq!(
        FetchReply::<u32>::from_json(json!({ "items": [4], "isLast": true })),
        FetchReply::Page(Page {
            items: vec![4],
            is_last: true
        })
    );
    assert!(matches!(
        FetchReply::<u32>::from_json(json!({ "rows": [] })),
        FetchReply::Unrecognized(_)
    ));
    assert!(matches!(
        FetchReply::<u32>::from_json(json!("nope")),
        FetchReply::Unrecognized(_)
    ));
}

#[cfg(feature = "serde")]
#[test]
fn window_state_serializes() {
    let state = WindowState {
        start: 3,
        end: 9,
        buffer_len: 12,
        ..WindowState::default()
    };
    let json = serde_json::to_value(state).map(|v| v["buffer_len"].clone());
    assert_eq!(json.ok(), Some(serde_json::json!(12)));
}

// --- array ---

fn scenario_options() -> ChunksArrayOptions<u32> {
    ChunksArrayOptions::new(10).with_window(0, 20)
}

#[tokio::test]
async fn end_to_end_scenario() {
    init_tracing();
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    assert!(!array.initial_load_done());

    assert!(matches!(
        array.wait_initial_load().await,
        Ok(TaskOutcome::Completed)
    ));
    array.settled().await;
    assert!(array.initial_load_done());
    assert_eq!(source.calls(), vec![(None, 20, 0), (Some(19), 10, 1)]);
    assert_eq!(indices(&array), (0..20).collect::<Vec<_>>());
    assert!(array.reached_start());
    assert!(!array.reached_end());

    array.set_window(15, 25);
    array.settled().await;
    assert_eq!(source.calls().last(), Some(&(Some(29), 10, 1)));
    assert_eq!(indices(&array), (15..25).collect::<Vec<_>>());
    assert_eq!(array.len(), 10);
    assert_eq!(array.object_at(0), Some(Row(15)));
    assert_eq!(array.buffer_len(), 40);
    assert_eq!(array.position_of_index(&39), Some(39));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_most_one_fetch_in_flight() {
    let source = VecSource::new(1000).with_cap(4);
    let array = ChunksArray::new(source.clone(), scenario_options());
    for step in 0..30 {
        array.set_window(step * 7, step * 7 + 20);
        if step % 3 == 0 {
            let _ = array.reload(ReloadOptions::default());
        }
        tokio::task::yield_now().await;
    }
    array.settled().await;

    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    let start = array.start() as u32;
    let expected: Vec<u32> = (start..start + 20).collect();
    assert_eq!(indices(&array), expected);
}

#[tokio::test]
async fn coalesced_requests_share_one_fetch() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;
    let before = source.calls().len();

    let a = array.fetch_next();
    let b = array.fetch_next();
    assert!(matches!(a.await, Ok(TaskOutcome::Completed)));
    assert!(matches!(b.await, Ok(TaskOutcome::Completed)));
    array.settled().await;
    assert_eq!(source.calls().len(), before + 1);
}

#[tokio::test]
async fn coalesced_backward_requests_share_one_fetch() {
    let source = VecSource::new(1000);
    let options = ChunksArrayOptions::new(10)
        .with_window(0, 10)
        .with_initial_jump_anchor(Some(500));
    let array = ChunksArray::new(source.clone(), options);
    array.settled().await;
    let before = source.calls().len();

    let a = array.fetch_prev();
    let b = array.fetch_prev();
    assert!(matches!(a.await, Ok(TaskOutcome::Completed)));
    assert!(matches!(b.await, Ok(TaskOutcome::Completed)));
    array.settled().await;

    let calls = source.calls();
    assert_eq!(calls.len(), before + 1);
    assert_eq!(calls.last(), Some(&(Some(490), 10, -10)));
    assert_eq!(array.first_item(), Some(Row(500)));
}

#[tokio::test]
async fn directional_fetch_is_refused_while_a_reload_is_pending() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());

    // The initial reload is still queued.
    assert!(matches!(
        array.fetch_prev().await,
        Ok(TaskOutcome::Refused)
    ));
    assert!(matches!(
        array.fetch_next().await,
        Ok(TaskOutcome::Refused)
    ));

    // Forcing skips the refusal.
    let forced = array.force_schedule(FetchTask::FetchNext, None);
    array.settled().await;
    assert!(matches!(forced.await, Ok(TaskOutcome::Completed)));
}

#[tokio::test]
async fn force_schedule_inserts_before_kind() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    let jump = array.jump(Some(300), 20);
    let _ = array.force_schedule(FetchTask::FetchNext, Some(TaskKind::Jump));
    array.settled().await;
    assert!(matches!(jump.await, Ok(TaskOutcome::Completed)));

    let calls = source.calls();
    assert_eq!(calls[0], (None, 20, 0));
    assert_eq!(calls[1], (Some(19), 10, 1));
    assert_eq!(calls[2], (Some(300), 20, 0));
    assert_eq!(array.first_item(), Some(Row(300)));
}

#[tokio::test]
async fn reload_preserves_the_tail() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;
    array.set_window(15, 25);
    array.settled().await;
    assert_eq!(array.buffer_len(), 40);

    let before = source.calls().len();
    let events = Recorder::default();
    events.attach(&array);
    let reload = array.reload(ReloadOptions::default());
    assert!(matches!(reload.await, Ok(TaskOutcome::Completed)));
    array.settled().await;

    let calls = source.calls();
    assert_eq!(calls[before], (Some(15), 10, 0));
    // The prefix came back as placeholders and is refilled from the head side.
    assert_eq!(calls[before + 1], (Some(15), 10, -10));
    assert_eq!(calls.len(), before + 2);

    assert_eq!(array.buffer_len(), 40);
    assert_eq!(array.position_of(&39), Some(39));
    assert_eq!(array.state().placeholders, 5);
    assert_eq!(indices(&array), (15..25).collect::<Vec<_>>());
    // Filling placeholders never resizes the head.
    assert!(events.take().iter().all(|e| !e.starts_with("head+")));
}

#[tokio::test]
async fn reload_with_offset_keeps_rows_in_place() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;
    array.set_window(15, 25);
    array.settled().await;
    let before = source.calls().len();

    let reload = array.reload(ReloadOptions::default().with_offset(-5));
    assert!(matches!(reload.await, Ok(TaskOutcome::Completed)));
    array.settled().await;

    let calls = source.calls();
    assert_eq!(calls[before], (Some(15), 10, -5));
    assert_eq!(calls.len(), before + 1);
    assert_eq!(indices(&array), (15..25).collect::<Vec<_>>());
    assert_eq!(array.buffer_len(), 40);
    assert_eq!(array.state().placeholders, 10);
    for i in 10..40 {
        assert_eq!(array.position_of(&i), Some(i as usize));
    }
}

#[tokio::test]
async fn backward_growth_is_announced_before_it_happens() {
    let source = VecSource::new(1000);
    let options = ChunksArrayOptions::new(10)
        .with_window(0, 10)
        .with_initial_jump_anchor(Some(500));
    let array = ChunksArray::new(source.clone(), options);
    let events = Recorder::default();
    events.attach(&array);
    array.settled().await;

    assert_eq!(
        source.calls(),
        vec![(Some(500), 10, 0), (Some(500), 10, -10), (Some(509), 10, 1)]
    );
    assert_eq!(
        events.take(),
        vec![
            "reset",
            "started Backward",
            "head+10 settled=false",
            "resolved Backward",
            "started Forward",
            "resolved Forward",
        ]
    );
    // The window shifted with the head, so it still shows the same rows.
    assert_eq!((array.start(), array.end()), (10, 20));
    assert_eq!(array.first_item(), Some(Row(500)));
    assert_eq!(array.buffer_len(), 30);

    // Scrolling up past the loaded head grows it again by one chunk.
    array.set_window(0, 10);
    array.settled().await;
    assert_eq!(source.calls().last(), Some(&(Some(490), 10, -10)));
    assert_eq!(
        events.take(),
        vec![
            "started Backward",
            "head+10 settled=false",
            "resolved Backward",
        ]
    );
    assert_eq!((array.start(), array.end()), (10, 20));
    assert_eq!(array.first_item(), Some(Row(490)));
    assert_eq!(array.len(), 10);
}

#[tokio::test]
async fn backward_fetch_stops_at_the_head() {
    let source = VecSource::new(1000);
    let options = ChunksArrayOptions::new(10)
        .with_window(0, 10)
        .with_initial_jump_anchor(Some(3));
    let array = ChunksArray::new(source.clone(), options);
    array.settled().await;

    assert!(array.reached_start());
    assert_eq!(array.position_of(&0), Some(0));
    assert_eq!((array.start(), array.end()), (3, 13));
    assert_eq!(array.first_item(), Some(Row(3)));
    assert_eq!(
        source
            .calls()
            .iter()
            .filter(|(_, _, offset)| *offset < 0)
            .count(),
        1
    );
}

#[tokio::test]
async fn backward_fetch_requeues_itself_while_the_need_holds() {
    let source = VecSource::new(1000);
    let options = ChunksArrayOptions::new(10)
        .with_window(0, 10)
        .with_load_more_threshold(25)
        .with_initial_jump_anchor(Some(500));
    let array = ChunksArray::new(source.clone(), options);
    array.settled().await;

    let backward: Vec<Call> = source
        .calls()
        .into_iter()
        .filter(|(_, _, offset)| *offset < 0)
        .collect();
    assert_eq!(
        backward,
        vec![
            (Some(500), 10, -10),
            (Some(490), 10, -10),
            (Some(480), 10, -10),
        ]
    );
    assert_eq!((array.start(), array.end()), (30, 40));
    assert_eq!(array.first_item(), Some(Row(500)));
}

#[tokio::test]
async fn backward_fetch_trims_placeholders_left_at_the_head() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;
    array.set_window(15, 25);
    array.settled().await;
    let before = source.calls().len();

    source.first.store(13, Ordering::SeqCst);
    let events = Recorder::default();
    events.attach(&array);
    let reload = array.reload(ReloadOptions::default());
    assert!(matches!(reload.await, Ok(TaskOutcome::Completed)));
    array.settled().await;

    let calls = source.calls();
    assert_eq!(calls[before..], [(Some(15), 10, 0), (Some(15), 10, -10)]);
    assert_eq!(
        events.take(),
        vec!["started Backward", "head-13 settled=false", "resolved Backward"]
    );
    assert_eq!((array.start(), array.end()), (2, 12));
    assert_eq!(indices(&array), (15..25).collect::<Vec<_>>());
    assert_eq!(array.position_of(&13), Some(0));
    assert!(array.reached_start());
}

#[tokio::test]
async fn jump_with_margin_lands_on_anchor() {
    let source = VecSource::new(1000);
    let options = ChunksArrayOptions::new(10).with_index_margin(2);
    let array = ChunksArray::new(source.clone(), options);
    array.settled().await;

    let jump = array.jump(Some(100), 10);
    assert!(matches!(jump.await, Ok(TaskOutcome::Completed)));
    array.settled().await;
    assert!(source.calls().contains(&(Some(100), 14, -2)));
    assert_eq!(indices(&array), (100..110).collect::<Vec<_>>());
}

#[tokio::test]
async fn jump_to_missing_anchor_leaves_buffer_untouched() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;
    let before = array.state();
    let visible = indices(&array);

    let jump = array.jump(Some(5000), 10);
    assert!(matches!(jump.await, Ok(TaskOutcome::AnchorNotFound)));
    array.settled().await;
    assert_eq!(array.state(), before);
    assert_eq!(indices(&array), visible);
    assert!(array.error().is_none());
}

#[tokio::test]
async fn jump_to_missing_anchor_keeps_the_previous_error() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;

    source.fail.store(true, Ordering::SeqCst);
    assert!(array.fetch_next().await.is_err());
    source.fail.store(false, Ordering::SeqCst);

    let jump = array.jump(Some(5000), 10);
    assert!(matches!(jump.await, Ok(TaskOutcome::AnchorNotFound)));
    array.settled().await;
    assert!(matches!(array.error(), Some(FetchError::Rejected(_))));
    assert_eq!(indices(&array), (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn fetch_errors_are_recorded_and_cleared_by_the_next_success() {
    let source = VecSource::new(1000);
    source.fail.store(true, Ordering::SeqCst);
    let array = ChunksArray::new(source.clone(), scenario_options());

    let initial = array.wait_initial_load().await;
    assert!(matches!(initial, Err(FetchError::Rejected(_))));
    array.settled().await;
    assert!(array.initial_load_done());
    assert!(array.state().has_error);
    assert!(array.is_empty());
    assert_eq!(source.calls().len(), 1);

    let events = Recorder::default();
    events.attach(&array);
    assert!(array.fetch_next().await.is_err());
    assert_eq!(events.take(), vec!["started Forward", "rejected Forward"]);

    source.fail.store(false, Ordering::SeqCst);
    let reload = array.reload(ReloadOptions::head());
    assert!(matches!(reload.await, Ok(TaskOutcome::Completed)));
    array.settled().await;
    assert!(array.error().is_none());
    assert_eq!(indices(&array), (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn destroy_cancels_running_and_queued_tasks() {
    let source = VecSource::new(1000);
    source.hang.store(true, Ordering::SeqCst);
    let array = ChunksArray::new(source.clone(), scenario_options());
    let jump = array.jump(Some(10), 10);
    while source.calls().is_empty() {
        tokio::task::yield_now().await;
    }

    array.destroy();
    assert!(array.is_destroyed());
    assert!(matches!(jump.await, Err(FetchError::Cancelled)));
    assert!(matches!(
        array.wait_initial_load().await,
        Err(FetchError::Cancelled)
    ));
    assert!(matches!(
        array.fetch_next().await,
        Err(FetchError::Cancelled)
    ));
    array.settled().await;
    assert_eq!(source.calls().len(), 1);
    assert!(array.error().is_none());
    assert_eq!(array.buffer_len(), 0);
}

#[tokio::test]
async fn slow_source_times_out() {
    let source = VecSource::new(1000);
    source.hang.store(true, Ordering::SeqCst);
    let options = scenario_options().with_fetch_timeout(Some(Duration::from_millis(20)));
    let array = ChunksArray::new(source.clone(), options);

    let initial = array.wait_initial_load().await;
    assert!(matches!(initial, Err(FetchError::TimedOut(limit)) if limit == Duration::from_millis(20)));
    assert!(matches!(array.error(), Some(FetchError::TimedOut(_))));
    assert!(!array.is_reloading());
}

#[tokio::test]
async fn empty_collection_settles_without_refetching() {
    let source = VecSource::new(0);
    let array = ChunksArray::new(source.clone(), scenario_options());
    array.settled().await;
    array.set_window(0, 40);
    array.settled().await;

    assert_eq!(source.calls(), vec![(None, 20, 0)]);
    assert!(array.is_empty());
    assert!(array.reached_start());
    assert!(array.reached_end());
}

#[tokio::test]
async fn unsubscribed_listener_is_not_called() {
    let source = VecSource::new(1000);
    let array = ChunksArray::new(source, scenario_options());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let id = array.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(array.unsubscribe(id));
    assert!(!array.unsubscribe(id));
    array.settled().await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

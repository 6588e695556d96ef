//! Dispatch engine: the scheduler's public contract (spec §4.1.1, §4.1.5)

use crate::cache::ImageCache;
use crate::core::config::SchedulerConfig;
use crate::core::{CacheError, ChapterId, PageId};
use crate::model::chapter::PageDescriptor;
use crate::scheduler::desired_set::{compute_desired_set, in_foreground_window, Cursor, ScrollDirection};
use crate::scheduler::lanes::Lane;
use crate::scheduler::retry;
use crate::scheduler::state::{CancelReason, PageRuntimeState};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, warn};

struct PageRecord {
    state: PageRuntimeState,
    token: u64,
    attempt: u32,
}

struct InFlight {
    token: u64,
    lane: Lane,
}

/// Per-lane debug counters (spec §4.1.8).
#[derive(Debug, Clone, Default)]
pub struct LaneStats {
    /// Pages currently queued in this lane
    pub queued: usize,
    /// Pages currently in flight, dispatched from this lane
    pub in_flight: usize,
}

/// Immutable snapshot of scheduler state (spec §4.1.1, §4.1.8).
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    /// Current state of every known page
    pub pages: HashMap<PageId, PageRuntimeState>,
    /// Per-lane queue and in-flight counts
    pub lanes: HashMap<Lane, LaneStats>,
    /// Lifetime cancelled counter
    pub cancelled: u64,
    /// Lifetime deprioritized (lane-change) counter
    pub deprioritized: u64,
    /// Elapsed ms from last cursor move to the first `Ready` in the foreground window
    pub cursor_to_first_ready_ms: Option<u64>,
}

/// Opaque handle returned by [`PageScheduler::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Inner {
    tasks: HashMap<PageId, PageDescriptor>,
    chapter_order: Vec<ChapterId>,
    cursor: Option<Cursor>,
    cursor_moved_at: Option<Instant>,
    cursor_to_first_ready_ms: Option<u64>,
    scroll_direction: ScrollDirection,
    records: HashMap<PageId, PageRecord>,
    queues: [VecDeque<PageId>; 5],
    in_flight_foreground: HashMap<PageId, InFlight>,
    in_flight_background: HashMap<PageId, InFlight>,
    listeners: Vec<(u64, Arc<dyn Fn() + Send + Sync>)>,
    next_listener_id: u64,
    cancelled: u64,
    deprioritized: u64,
    config: SchedulerConfig,
    disposed: bool,
}

impl Inner {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            tasks: HashMap::new(),
            chapter_order: Vec::new(),
            cursor: None,
            cursor_moved_at: None,
            cursor_to_first_ready_ms: None,
            scroll_direction: ScrollDirection::Forward,
            records: HashMap::new(),
            queues: Default::default(),
            in_flight_foreground: HashMap::new(),
            in_flight_background: HashMap::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            cancelled: 0,
            deprioritized: 0,
            config,
            disposed: false,
        }
    }

    fn record_mut(&mut self, page_id: &PageId) -> &mut PageRecord {
        self.records.entry(page_id.clone()).or_insert_with(|| PageRecord {
            state: PageRuntimeState::Idle,
            token: 0,
            attempt: 0,
        })
    }

    fn remove_from_all_queues(&mut self, page_id: &PageId) {
        for queue in &mut self.queues {
            queue.retain(|id| id != page_id);
        }
    }

    fn enqueue(&mut self, page_id: &PageId, lane: Lane) {
        self.remove_from_all_queues(page_id);
        self.queues[lane.index()].push_back(page_id.clone());
        let record = self.record_mut(page_id);
        record.state = PageRuntimeState::Queued { lane, queued_at: SystemTime::now() };
    }

    /// Recompute the desired set against the current cursor/tasks/chapter
    /// order/config and reconcile it with current per-page state (spec §4.1.4).
    /// `reason` is attached to any page this recompute demotes or cancels:
    /// ordinary cursor/task/config churn uses [`CancelReason::Recompute`];
    /// [`PageScheduler::on_chapter_switch`] passes [`CancelReason::ChapterSwitch`]
    /// so the pages it proactively sheds carry that reason (spec §4.1.1, S3).
    fn reconcile_desired_set(&mut self, reason: CancelReason) {
        let Some(cursor) = self.cursor.clone() else { return };
        let desired = compute_desired_set(&cursor, &self.tasks, &self.chapter_order, &self.config);

        let known_page_ids: Vec<PageId> = self.tasks.keys().cloned().collect();
        let mut fresh_admissions: HashMap<Lane, Vec<PageId>> = HashMap::new();
        for page_id in known_page_ids {
            let in_desired = desired.get(&page_id).copied();
            let disturbable = self
                .records
                .get(&page_id)
                .map(|r| r.state.is_disturbable_by_recompute())
                .unwrap_or(true);
            if !disturbable {
                continue;
            }

            match in_desired {
                Some(lane) => {
                    if self.admit_into_desired_lane(&page_id, lane) {
                        fresh_admissions.entry(lane).or_default().push(page_id);
                    }
                }
                None => self.remove_from_desired_set(&page_id, reason),
            }
        }

        // Pages newly admitted into the same lane this pass are ordered by
        // scroll direction before entering the lane's FIFO queue, so the
        // reader's actual scroll direction wins prefetch ties within a lane
        // (supplemented feature, not a new lane or invariant change).
        for (lane, mut page_ids) in fresh_admissions {
            page_ids.sort_by_key(|id| match self.scroll_direction {
                ScrollDirection::Forward => id.page_index as i64,
                ScrollDirection::Backward => -(id.page_index as i64),
            });
            for page_id in page_ids {
                self.enqueue(&page_id, lane);
            }
        }
    }

    /// Whether `page_id` needs a fresh enqueue into `lane`. Returns `false`
    /// (and, for lane changes, enqueues immediately) when no ordering
    /// decision is left to make; returns `true` when the caller should
    /// collect `page_id` for direction-biased ordering before enqueuing.
    fn admit_into_desired_lane(&mut self, page_id: &PageId, lane: Lane) -> bool {
        let current_lane = match self.records.get(page_id).map(|r| &r.state) {
            Some(PageRuntimeState::Queued { lane, .. }) => Some(*lane),
            Some(PageRuntimeState::Loading { lane, .. }) => Some(*lane),
            // A non-terminal Error is disturbable (it can be cancelled if it
            // leaves the desired set) but must not be bounced straight back
            // into a lane by ordinary recompute — revival is the auto-retry
            // timer, `retry_page`, or leaving and re-entering the desired set,
            // never "still present on this reconcile pass".
            Some(PageRuntimeState::Error { .. }) => return false,
            _ => None,
        };

        match current_lane {
            Some(existing) if existing == lane => false,
            Some(existing) => {
                if matches!(self.records.get(page_id).map(|r| &r.state), Some(PageRuntimeState::Loading { .. })) {
                    // Already dispatched; leave the in-flight attempt alone, it
                    // will simply reuse `lane` bookkeeping on completion.
                    let _ = existing;
                    false
                } else {
                    self.deprioritized += 1;
                    true
                }
            }
            None => true,
        }
    }

    fn remove_from_desired_set(&mut self, page_id: &PageId, reason: CancelReason) {
        let was_queued = matches!(self.records.get(page_id).map(|r| &r.state), Some(PageRuntimeState::Queued { .. }));
        if was_queued {
            self.remove_from_all_queues(page_id);
            self.cancel(page_id, reason);
            return;
        }

        if let Some(in_flight) = self.in_flight_background.get(page_id) {
            // Background work not in the desired set is cancelled by bumping
            // its token; the completion callback will drop the stale result.
            let token = in_flight.token;
            if let Some(record) = self.records.get_mut(page_id) {
                if record.token == token {
                    record.token += 1;
                }
            }
        }
        // Foreground in-flight work is allowed to complete (spec §4.1.4).
    }

    fn cancel(&mut self, page_id: &PageId, reason: CancelReason) {
        self.cancelled += 1;
        crate::system::EngineMetrics::global().record_page_cancelled();
        let record = self.record_mut(page_id);
        record.state = PageRuntimeState::Cancelled { reason, cancelled_at: SystemTime::now() };
    }

    /// Apply `update_tasks`: drop removed pages, seed new ones as `Idle`.
    fn apply_update_tasks(&mut self, tasks: HashMap<PageId, PageDescriptor>) {
        let removed: Vec<PageId> = self.tasks.keys().filter(|id| !tasks.contains_key(id)).cloned().collect();
        for page_id in removed {
            self.remove_from_all_queues(&page_id);
            self.in_flight_foreground.remove(&page_id);
            self.in_flight_background.remove(&page_id);
            if let Some(record) = self.records.get_mut(&page_id) {
                record.token += 1;
            }
            self.cancel(&page_id, CancelReason::TaskRemoved);
            self.records.remove(&page_id);
        }

        for page_id in tasks.keys() {
            self.records.entry(page_id.clone()).or_insert_with(|| PageRecord {
                state: PageRuntimeState::Idle,
                token: 0,
                attempt: 0,
            });
        }

        self.tasks = tasks;
    }

    /// Distance-based eviction coupling (spec §4.1.7): return chapters whose
    /// cached artifacts may be evicted now.
    fn chapters_eligible_for_eviction(&self) -> Vec<ChapterId> {
        let Some(cursor) = &self.cursor else { return Vec::new() };
        let Some(cursor_pos) = self.chapter_order.iter().position(|id| id == &cursor.chapter_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (pos, chapter_id) in self.chapter_order.iter().enumerate() {
            let distance = (pos as i64 - cursor_pos as i64).unsigned_abs();
            if distance <= 1 {
                continue;
            }
            let has_in_flight = self
                .in_flight_foreground
                .keys()
                .chain(self.in_flight_background.keys())
                .any(|id| &id.chapter_id == chapter_id);
            let has_manual_retry = self.queues[Lane::ManualRetry.index()].iter().any(|id| &id.chapter_id == chapter_id);
            if !has_in_flight && !has_manual_retry {
                out.push(chapter_id.clone());
            }
        }
        out
    }

    /// Admission pump (spec §4.1.5). Returns dispatches to spawn after the
    /// lock is released.
    fn pump(&mut self) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        let fg_cap = self.config.foreground_concurrency;
        let bg_cap = self.config.background_concurrency;

        while self.in_flight_foreground.len() < fg_cap {
            let Some(lane) = [Lane::ManualRetry, Lane::VisibleOrCursor, Lane::ForegroundWindow]
                .into_iter()
                .find(|lane| !self.queues[lane.index()].is_empty())
            else {
                break;
            };
            let page_id = self.queues[lane.index()].pop_front().unwrap();
            if let Some(dispatch) = self.dispatch(&page_id, lane, true) {
                dispatches.push(dispatch);
            }
        }

        let foreground_pending = [Lane::ManualRetry, Lane::VisibleOrCursor, Lane::ForegroundWindow]
            .into_iter()
            .any(|lane| !self.queues[lane.index()].is_empty());

        if !foreground_pending {
            while self.in_flight_background.len() < bg_cap {
                let Some(lane) = [Lane::InChapterPrefetch, Lane::NextChapterPrefetch]
                    .into_iter()
                    .find(|lane| !self.queues[lane.index()].is_empty())
                else {
                    break;
                };
                let page_id = self.queues[lane.index()].pop_front().unwrap();
                if let Some(dispatch) = self.dispatch(&page_id, lane, false) {
                    dispatches.push(dispatch);
                }
            }
        }

        dispatches
    }

    fn dispatch(&mut self, page_id: &PageId, lane: Lane, foreground: bool) -> Option<Dispatch> {
        let descriptor = self.tasks.get(page_id)?.clone();
        let record = self.record_mut(page_id);
        record.attempt += 1;
        record.token += 1;
        let token = record.token;
        let attempt = record.attempt;
        record.state = PageRuntimeState::Loading { lane, attempt, started_at: SystemTime::now() };

        if foreground {
            self.in_flight_foreground.insert(page_id.clone(), InFlight { token, lane });
        } else {
            self.in_flight_background.insert(page_id.clone(), InFlight { token, lane });
        }

        Some(Dispatch {
            page_id: page_id.clone(),
            chapter_id: descriptor.chapter_id,
            url: descriptor.image_url,
            headers: descriptor.headers,
            lane,
            foreground,
            attempt,
            token,
        })
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn Fn() + Send + Sync>> {
        self.listeners.iter().map(|(_, f)| f.clone()).collect()
    }
}

struct Dispatch {
    page_id: PageId,
    chapter_id: ChapterId,
    url: String,
    headers: Option<Arc<HashMap<String, String>>>,
    lane: Lane,
    foreground: bool,
    attempt: u32,
    token: u64,
}

/// Maintains, for each known page, a [`PageRuntimeState`] reflecting
/// progress toward a locally cached artifact (spec §4.1).
pub struct PageScheduler {
    inner: Arc<Mutex<Inner>>,
    cache: Arc<ImageCache>,
}

impl PageScheduler {
    /// Construct a scheduler over `cache`, with no known tasks and no cursor.
    /// Must be called from within a Tokio runtime: dispatch work is spawned
    /// with `tokio::spawn`.
    pub fn new(config: SchedulerConfig, cache: Arc<ImageCache>) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::new(config))), cache }
    }

    /// Replace the known page set (spec §4.1.1).
    pub fn update_tasks(&self, tasks: HashMap<PageId, PageDescriptor>) {
        self.commit(|inner| inner.apply_update_tasks(tasks));
    }

    /// Replace the authoritative chapter order.
    pub fn set_chapter_order(&self, order: Vec<ChapterId>) {
        self.commit(|inner| inner.chapter_order = order);
    }

    /// Move the reading cursor, clamped to the known page range of its chapter.
    pub fn set_cursor(&self, chapter_id: ChapterId, page_index: u32) {
        self.set_cursor_with_reason(chapter_id, page_index, CancelReason::Recompute);
    }

    /// Equivalent to `set_cursor(target, 0)`, except pages the recompute
    /// sheds as a result carry [`CancelReason::ChapterSwitch`] instead of
    /// [`CancelReason::Recompute`] (spec §4.1.1, scenario S3).
    pub fn on_chapter_switch(&self, target_chapter_id: ChapterId) {
        self.set_cursor_with_reason(target_chapter_id, 0, CancelReason::ChapterSwitch);
    }

    fn set_cursor_with_reason(&self, chapter_id: ChapterId, page_index: u32, reason: CancelReason) {
        self.commit_with_reason(reason, |inner| {
            let max_index =
                inner.tasks.keys().filter(|id| id.chapter_id == chapter_id).map(|id| id.page_index).max();
            let clamped = match max_index {
                Some(max) => page_index.min(max),
                None => page_index,
            };

            if let Some(prev) = &inner.cursor {
                let prev_position = inner.chapter_order.iter().position(|id| id == &prev.chapter_id).unwrap_or(0);
                let next_position = inner.chapter_order.iter().position(|id| id == &chapter_id).unwrap_or(0);
                let prev_key = (prev_position, prev.page_index);
                let next_key = (next_position, clamped);
                if next_key != prev_key {
                    inner.scroll_direction =
                        if next_key > prev_key { ScrollDirection::Forward } else { ScrollDirection::Backward };
                }
            }

            inner.cursor = Some(Cursor { chapter_id, page_index: clamped });
            inner.cursor_moved_at = Some(Instant::now());
            inner.cursor_to_first_ready_ms = None;

            let evictable = inner.chapters_eligible_for_eviction();
            for chapter_id in evictable {
                self.cache.evict_chapter(&chapter_id);
            }
        });
    }

    /// Force-enqueue a page into the highest priority lane, regardless of
    /// its current state.
    pub fn retry_page(&self, page_id: &PageId) {
        let page_id = page_id.clone();
        self.commit(move |inner| {
            if !inner.tasks.contains_key(&page_id) {
                return;
            }
            inner.in_flight_foreground.remove(&page_id);
            inner.in_flight_background.remove(&page_id);
            if let Some(record) = inner.records.get_mut(&page_id) {
                record.token += 1;
            }
            inner.enqueue(&page_id, Lane::ManualRetry);
        });
    }

    /// Register a listener invoked synchronously after every state-affecting
    /// operation. Returns an id usable with [`PageScheduler::unsubscribe`].
    pub fn subscribe(&self, listener: Arc<dyn Fn() + Send + Sync>) -> SubscriptionId {
        let mut inner = self.inner.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, listener));
        SubscriptionId(id)
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|(existing, _)| *existing != id.0);
    }

    /// Immutable view of per-page state and debug statistics.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let inner = self.inner.lock();
        let pages = inner.records.iter().map(|(id, record)| (id.clone(), record.state.clone())).collect();

        let mut lanes = HashMap::new();
        for lane in Lane::ALL {
            let queued = inner.queues[lane.index()].len();
            let in_flight = inner
                .in_flight_foreground
                .values()
                .chain(inner.in_flight_background.values())
                .filter(|f| f.lane == lane)
                .count();
            lanes.insert(lane, LaneStats { queued, in_flight });
        }

        SchedulerSnapshot {
            pages,
            lanes,
            cancelled: inner.cancelled,
            deprioritized: inner.deprioritized,
            cursor_to_first_ready_ms: inner.cursor_to_first_ready_ms,
        }
    }

    /// Cancel all work, clear timers and listeners, release internal state.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        inner.disposed = true;
        inner.tasks.clear();
        inner.records.clear();
        for queue in &mut inner.queues {
            queue.clear();
        }
        inner.in_flight_foreground.clear();
        inner.in_flight_background.clear();
        inner.listeners.clear();
        inner.chapter_order.clear();
        inner.cursor = None;
    }

    /// Run `mutate`, reconcile the desired set, pump dispatches, notify
    /// listeners, then spawn any resulting downloads.
    fn commit(&self, mutate: impl FnOnce(&mut Inner)) {
        self.commit_with_reason(CancelReason::Recompute, mutate);
    }

    /// As [`Self::commit`], but pages the recompute sheds are cancelled with
    /// `reason` instead of the default [`CancelReason::Recompute`].
    fn commit_with_reason(&self, reason: CancelReason, mutate: impl FnOnce(&mut Inner)) {
        let (dispatches, listeners) = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            mutate(&mut inner);
            inner.reconcile_desired_set(reason);
            let dispatches = inner.pump();
            (dispatches, inner.listeners_snapshot())
        };
        for listener in listeners {
            listener();
        }
        spawn_dispatches(&self.inner, &self.cache, dispatches);
    }
}

/// Spawn the fetch/complete cycle for each freshly-admitted dispatch.
fn spawn_dispatches(inner: &Arc<Mutex<Inner>>, cache: &Arc<ImageCache>, dispatches: Vec<Dispatch>) {
    for dispatch in dispatches {
        let inner = inner.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            let outcome = cache.fetch(&dispatch.chapter_id, &dispatch.url, dispatch.headers.clone()).await;
            complete(&inner, &cache, dispatch, outcome);
        });
    }
}

/// Apply a resolved fetch outcome: commit `Ready`/`Error`, reconcile, pump,
/// and spawn whatever the pump newly admitted (spec §4.1.5).
fn complete(
    inner: &Arc<Mutex<Inner>>,
    cache: &Arc<ImageCache>,
    dispatch: Dispatch,
    outcome: Result<crate::cache::CachedArtifact, CacheError>,
) {
    let (dispatches, listeners, retry_timer) = {
        let mut guard = inner.lock();
        if guard.disposed {
            return;
        }
        let still_current = guard.records.get(&dispatch.page_id).map(|r| r.token) == Some(dispatch.token);
        if dispatch.foreground {
            guard.in_flight_foreground.remove(&dispatch.page_id);
        } else {
            guard.in_flight_background.remove(&dispatch.page_id);
        }

        let mut retry_timer = None;
        if still_current {
            match outcome {
                Ok(artifact) => {
                    let record = guard.record_mut(&dispatch.page_id);
                    record.state = PageRuntimeState::Ready {
                        local_path: artifact.local_path,
                        width: artifact.width,
                        height: artifact.height,
                        byte_length: artifact.byte_length,
                        loaded_at: SystemTime::now(),
                    };
                    let within_foreground_window = guard
                        .cursor
                        .as_ref()
                        .is_some_and(|cursor| in_foreground_window(&dispatch.page_id, cursor, &guard.config));
                    if within_foreground_window && guard.cursor_to_first_ready_ms.is_none() {
                        if let Some(moved_at) = guard.cursor_moved_at {
                            guard.cursor_to_first_ready_ms = Some(moved_at.elapsed().as_millis() as u64);
                        }
                    }
                    crate::system::EngineMetrics::global().record_page_ready();
                    debug!(page_id = %dispatch.page_id, "page ready");
                }
                Err(err) => {
                    crate::system::EngineMetrics::global().record_page_failed();
                    let eligible = retry::eligible_for_auto_retry(&guard.config, err.retriable, dispatch.attempt);
                    let next_retry_at = if eligible {
                        let backoff = retry::backoff_for_attempt(&guard.config, dispatch.attempt);
                        retry_timer = Some((dispatch.page_id.clone(), dispatch.token, backoff));
                        Some(SystemTime::now() + backoff)
                    } else {
                        None
                    };
                    let terminal = retry::is_terminal(&guard.config, err.retriable, dispatch.attempt);
                    warn!(page_id = %dispatch.page_id, error = %err.message, "page load failed");
                    let record = guard.record_mut(&dispatch.page_id);
                    record.state = PageRuntimeState::Error {
                        lane: dispatch.lane,
                        retriable: err.retriable,
                        code: err.code,
                        status_code: err.status_code,
                        attempt: dispatch.attempt,
                        last_error: err.message,
                        next_retry_at,
                        terminal,
                        failed_at: SystemTime::now(),
                    };
                }
            }
        }

        guard.reconcile_desired_set(CancelReason::Recompute);
        let dispatches = guard.pump();
        (dispatches, guard.listeners_snapshot(), retry_timer)
    };

    for listener in &listeners {
        listener();
    }
    spawn_dispatches(inner, cache, dispatches);

    if let Some((page_id, token, backoff)) = retry_timer {
        let inner = inner.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            fire_retry_timer(&inner, &cache, page_id, token);
        });
    }
}

/// Promote a page whose auto-retry timer has fired back into
/// `ForegroundWindow`, unless it has since been cancelled or superseded
/// (spec §4.1.6).
fn fire_retry_timer(inner: &Arc<Mutex<Inner>>, cache: &Arc<ImageCache>, page_id: PageId, token: u64) {
    let (dispatches, listeners) = {
        let mut guard = inner.lock();
        if guard.disposed {
            return;
        }
        let still_current = guard.records.get(&page_id).map(|r| r.token) == Some(token);
        if !still_current || !guard.tasks.contains_key(&page_id) {
            return;
        }
        guard.enqueue(&page_id, Lane::ForegroundWindow);
        guard.reconcile_desired_set(CancelReason::Recompute);
        let dispatches = guard.pump();
        (dispatches, guard.listeners_snapshot())
    };
    for listener in listeners {
        listener();
    }
    spawn_dispatches(inner, cache, dispatches);
}

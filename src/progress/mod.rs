//! Debounced progress/history/timeline sync (spec §4.5)

use crate::collaborators::{ProgressSink, ProgressSnapshot, QueryCacheInvalidator, TimelineEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct Inner {
    pending: Option<ProgressSnapshot>,
    generation: u64,
    last_chapter_id: Option<crate::core::ChapterId>,
    last_event: Option<(TimelineEvent, Instant)>,
}

/// Translates cursor movements into at-most-one-per-window writes to the
/// external progress collaborator, plus timeline events on chapter change
/// or session teardown (spec §4.5).
pub struct ProgressSync {
    sink: Arc<dyn ProgressSink>,
    invalidator: Option<Arc<dyn QueryCacheInvalidator>>,
    inner: Mutex<Inner>,
    debounce: Duration,
    dup_guard: Duration,
}

impl ProgressSync {
    /// Build a sync writer with `debounce_ms`/`timeline_dup_guard_ms` taken
    /// from [`crate::core::config::ProgressConfig`].
    pub fn new(
        sink: Arc<dyn ProgressSink>,
        invalidator: Option<Arc<dyn QueryCacheInvalidator>>,
        debounce_ms: u64,
        dup_guard_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            sink,
            invalidator,
            inner: Mutex::new(Inner { pending: None, generation: 0, last_chapter_id: None, last_event: None }),
            debounce: Duration::from_millis(debounce_ms),
            dup_guard: Duration::from_millis(dup_guard_ms),
        })
    }

    /// Record a cursor movement, resetting the debounce timer (spec §4.5).
    /// `self` must be held in an `Arc` so the debounce timer can outlive the call.
    pub fn on_cursor_changed(self: &Arc<Self>, snapshot: ProgressSnapshot) {
        let generation = {
            let mut inner = self.inner.lock();
            inner.pending = Some(snapshot);
            inner.generation += 1;
            inner.generation
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            this.fire_if_current(generation);
        });
    }

    fn fire_if_current(&self, generation: u64) {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.pending.take()
        };
        if let Some(snapshot) = snapshot {
            self.flush_snapshot(&snapshot);
        }
    }

    /// Cancel any pending timer and flush synchronously (spec §4.5: app
    /// backgrounding or explicit dispose).
    pub fn flush_now(&self) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.pending.take()
        };
        if let Some(snapshot) = snapshot {
            self.flush_snapshot(&snapshot);
        }
    }

    fn flush_snapshot(&self, snapshot: &ProgressSnapshot) {
        self.sink.upsert_progress(snapshot);
        self.sink.upsert_history(snapshot);
        self.maybe_emit_timeline_event(snapshot);

        if let Some(invalidator) = &self.invalidator {
            invalidator.invalidate(&[format!("progress::{}::{}", snapshot.source_id, snapshot.work_id)]);
        }
    }

    fn maybe_emit_timeline_event(&self, snapshot: &ProgressSnapshot) {
        let event = TimelineEvent {
            source_id: snapshot.source_id.clone(),
            work_id: snapshot.work_id.clone(),
            chapter_id: snapshot.chapter_id.clone(),
            page_index: snapshot.page_index,
            total_pages: snapshot.total_pages,
        };

        let mut inner = self.inner.lock();
        let chapter_changed = inner.last_chapter_id.as_ref() != Some(&snapshot.chapter_id);
        inner.last_chapter_id = Some(snapshot.chapter_id.clone());
        if !chapter_changed {
            return;
        }
        self.commit_timeline_event(&mut inner, event);
    }

    /// Force a timeline event regardless of chapter-change, used on
    /// backgrounding/dispose (spec §4.5), still subject to the duplicate guard.
    pub fn emit_timeline_event(&self, event: TimelineEvent) {
        let mut inner = self.inner.lock();
        self.commit_timeline_event(&mut inner, event);
    }

    fn commit_timeline_event(&self, inner: &mut Inner, event: TimelineEvent) {
        if let Some((last, at)) = &inner.last_event {
            if *last == event && at.elapsed() < self.dup_guard {
                debug!("suppressing duplicate timeline event within dup-guard window");
                return;
            }
        }
        self.sink.insert_timeline_event(&event);
        inner.last_event = Some((event, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChapterId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        progress_calls: AtomicUsize,
        timeline_events: StdMutex<Vec<TimelineEvent>>,
    }

    impl ProgressSink for RecordingSink {
        fn upsert_progress(&self, _snapshot: &ProgressSnapshot) {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn upsert_history(&self, _snapshot: &ProgressSnapshot) {}
        fn insert_timeline_event(&self, event: &TimelineEvent) {
            self.timeline_events.lock().unwrap().push(event.clone());
        }
    }

    fn snapshot(chapter_id: &str, page_index: u32) -> ProgressSnapshot {
        ProgressSnapshot {
            source_id: "src".into(),
            work_id: "work".into(),
            chapter_id: ChapterId::new(chapter_id),
            page_index,
            total_pages: Some(10),
        }
    }

    #[tokio::test]
    async fn debounced_writes_coalesce_to_the_latest_snapshot() {
        let sink = Arc::new(RecordingSink::default());
        let sync = ProgressSync::new(sink.clone(), None, 30, 5000);

        sync.on_cursor_changed(snapshot("ch0", 1));
        sync.on_cursor_changed(snapshot("ch0", 2));
        sync.on_cursor_changed(snapshot("ch0", 3));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sink.progress_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chapter_change_emits_a_timeline_event() {
        let sink = Arc::new(RecordingSink::default());
        let sync = ProgressSync::new(sink.clone(), None, 10, 5000);

        sync.on_cursor_changed(snapshot("ch0", 0));
        tokio::time::sleep(Duration::from_millis(40)).await;
        sync.on_cursor_changed(snapshot("ch1", 0));
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(sink.timeline_events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn flush_now_bypasses_the_debounce_timer() {
        let sink = Arc::new(RecordingSink::default());
        let sync = ProgressSync::new(sink.clone(), None, 10_000, 5000);

        sync.on_cursor_changed(snapshot("ch0", 1));
        sync.flush_now();
        assert_eq!(sink.progress_calls.load(Ordering::SeqCst), 1);
    }
}

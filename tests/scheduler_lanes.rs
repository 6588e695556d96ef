//! End-to-end scheduler tests: lanes, admission, cancellation, retry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webtoon_session::cache::ImageCache;
use webtoon_session::collaborators::{FileSystem, HttpClient, HttpResponse, ImageDecoder};
use webtoon_session::core::config::SchedulerConfig;
use webtoon_session::core::{ChapterId, PageId};
use webtoon_session::model::chapter::PageDescriptor;
use webtoon_session::scheduler::{Lane, PageRuntimeState, PageScheduler};

struct FakeFs {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl FakeFs {
    fn new() -> Self {
        Self { files: Mutex::new(HashMap::new()) }
    }
}

impl FileSystem for FakeFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
    fn make_directory(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        self.files.lock().unwrap().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }
    fn delete(&self, path: &Path) -> std::io::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
    fn read_directory(&self, _path: &Path) -> std::io::Result<Vec<PathBuf>> {
        Ok(self.files.lock().unwrap().keys().cloned().collect())
    }
}

struct FakeHttp {
    calls: AtomicUsize,
    fail_until: AtomicUsize,
}

impl FakeHttp {
    fn always_ok() -> Self {
        Self { calls: AtomicUsize::new(0), fail_until: AtomicUsize::new(0) }
    }
}

impl HttpClient for FakeHttp {
    fn get(&self, _url: &str, _headers: Option<&HashMap<String, String>>) -> webtoon_session::core::Result<HttpResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_until.load(Ordering::SeqCst) {
            return Ok(HttpResponse { status: 500, body: vec![] });
        }
        Ok(HttpResponse { status: 200, body: vec![0u8; 8] })
    }
}

struct FakeDecoder;
impl ImageDecoder for FakeDecoder {
    fn dimensions(&self, _path: &Path) -> webtoon_session::core::Result<(u32, u32)> {
        Ok((800, 1200))
    }
}

fn tasks_for(chapter_id: &ChapterId, count: u32) -> HashMap<PageId, PageDescriptor> {
    (0..count)
        .map(|page_index| {
            let page_id = PageId { chapter_id: chapter_id.clone(), page_index };
            let descriptor = PageDescriptor {
                chapter_id: chapter_id.clone(),
                page_index,
                image_url: format!("https://x/{chapter_id}/{page_index}.jpg"),
                headers: None,
                size_hint: None,
            };
            (page_id, descriptor)
        })
        .collect()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn tight_config() -> SchedulerConfig {
    SchedulerConfig {
        window_ahead: 3,
        window_behind: 1,
        foreground_concurrency: 1,
        background_concurrency: 1,
        chapter_preload_lead_pages: 2,
        max_auto_retries: 2,
        auto_retry_backoff_ms: vec![20, 40],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cursor_page_reaches_ready() {
    let cache = Arc::new(
        ImageCache::new(PathBuf::from("/cache"), Arc::new(FakeHttp::always_ok()), Arc::new(FakeFs::new()), Arc::new(FakeDecoder))
            .unwrap(),
    );
    let scheduler = PageScheduler::new(tight_config(), cache);
    let chapter_id = ChapterId::new("ch0");

    scheduler.update_tasks(tasks_for(&chapter_id, 10));
    scheduler.set_chapter_order(vec![chapter_id.clone()]);
    scheduler.set_cursor(chapter_id.clone(), 0);

    let cursor_page = PageId { chapter_id: chapter_id.clone(), page_index: 0 };
    wait_until(|| {
        matches!(scheduler.snapshot().pages.get(&cursor_page), Some(PageRuntimeState::Ready { .. }))
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pages_outside_window_are_cancelled_on_cursor_move() {
    let cache = Arc::new(
        ImageCache::new(PathBuf::from("/cache"), Arc::new(FakeHttp::always_ok()), Arc::new(FakeFs::new()), Arc::new(FakeDecoder))
            .unwrap(),
    );
    let scheduler = PageScheduler::new(tight_config(), cache);
    let chapter_id = ChapterId::new("ch0");

    scheduler.update_tasks(tasks_for(&chapter_id, 20));
    scheduler.set_chapter_order(vec![chapter_id.clone()]);
    scheduler.set_cursor(chapter_id.clone(), 0);

    // Page 3 lands in the background prefetch lane, which only ever drains
    // once the foreground pool is empty — with cursor at 0 it stays queued
    // long enough to move the cursor away before it's ever dispatched.
    scheduler.set_cursor(chapter_id.clone(), 15);

    let far_page = PageId { chapter_id: chapter_id.clone(), page_index: 3 };
    wait_until(|| matches!(scheduler.snapshot().pages.get(&far_page), Some(PageRuntimeState::Cancelled { .. })))
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_page_forces_manual_retry_lane() {
    let http = Arc::new(FakeHttp::always_ok());
    http.fail_until.store(1, Ordering::SeqCst);
    let cache = Arc::new(ImageCache::new(PathBuf::from("/cache"), http, Arc::new(FakeFs::new()), Arc::new(FakeDecoder)).unwrap());
    let scheduler = PageScheduler::new(tight_config(), cache);
    let chapter_id = ChapterId::new("ch0");

    scheduler.update_tasks(tasks_for(&chapter_id, 5));
    scheduler.set_chapter_order(vec![chapter_id.clone()]);
    scheduler.set_cursor(chapter_id.clone(), 0);

    let page_id = PageId { chapter_id: chapter_id.clone(), page_index: 0 };
    // First attempt fails (HTTP 500) but is retriable, so it will auto-retry;
    // force it manually instead and confirm it still converges on Ready.
    scheduler.retry_page(&page_id);
    wait_until(|| matches!(scheduler.snapshot().pages.get(&page_id), Some(PageRuntimeState::Ready { .. }))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn foreground_pool_respects_concurrency_cap() {
    let cache = Arc::new(
        ImageCache::new(PathBuf::from("/cache"), Arc::new(FakeHttp::always_ok()), Arc::new(FakeFs::new()), Arc::new(FakeDecoder))
            .unwrap(),
    );
    let mut config = tight_config();
    config.foreground_concurrency = 1;
    let scheduler = PageScheduler::new(config, cache);
    let chapter_id = ChapterId::new("ch0");

    scheduler.update_tasks(tasks_for(&chapter_id, 10));
    scheduler.set_chapter_order(vec![chapter_id.clone()]);
    scheduler.set_cursor(chapter_id.clone(), 0);

    let snapshot = scheduler.snapshot();
    let loading_or_ready_in_foreground = snapshot.lanes.get(&Lane::VisibleOrCursor).map(|s| s.in_flight).unwrap_or(0)
        + snapshot.lanes.get(&Lane::ForegroundWindow).map(|s| s.in_flight).unwrap_or(0);
    assert!(loading_or_ready_in_foreground <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_max_auto_retries_leaves_failures_non_terminal() {
    let http = Arc::new(FakeHttp::always_ok());
    http.fail_until.store(usize::MAX, Ordering::SeqCst);
    let cache = Arc::new(ImageCache::new(PathBuf::from("/cache"), http, Arc::new(FakeFs::new()), Arc::new(FakeDecoder)).unwrap());
    let mut config = tight_config();
    config.max_auto_retries = 0;
    let scheduler = PageScheduler::new(config, cache);
    let chapter_id = ChapterId::new("ch0");

    scheduler.update_tasks(tasks_for(&chapter_id, 5));
    scheduler.set_chapter_order(vec![chapter_id.clone()]);
    scheduler.set_cursor(chapter_id.clone(), 0);

    let page_id = PageId { chapter_id: chapter_id.clone(), page_index: 0 };
    wait_until(|| {
        matches!(
            scheduler.snapshot().pages.get(&page_id),
            Some(PageRuntimeState::Error { terminal: false, next_retry_at: None, .. })
        )
    })
    .await;

    // No automatic retry timer exists for max_auto_retries = 0: the failure
    // is stable rather than silently revived.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        scheduler.snapshot().pages.get(&page_id),
        Some(PageRuntimeState::Error { terminal: false, attempt: 1, .. })
    ));

    // Still revivable manually, since the error is non-terminal: retrying
    // dispatches a second attempt (observed either mid-flight as `Loading`
    // or, once it too fails, as a fresh `Error` with `attempt == 2`).
    scheduler.retry_page(&page_id);
    wait_until(|| {
        matches!(
            scheduler.snapshot().pages.get(&page_id),
            Some(PageRuntimeState::Loading { .. }) | Some(PageRuntimeState::Error { attempt: 2, .. })
        )
    })
    .await;
}

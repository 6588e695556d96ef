//! Terminal demo driving the reading-session engine end to end against a
//! synthetic catalog: no real network traffic, but every collaborator seam
//! is exercised the way a host app would wire them.

use clap::Parser;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use webtoon_session::cache::{ImageCache, ImageSizeDecoder, StdFileSystem};
use webtoon_session::collaborators::{CatalogClient, HttpClient, HttpResponse, ProgressSink, ProgressSnapshot, TimelineEvent};
use webtoon_session::core::config::SchedulerConfig;
use webtoon_session::core::{ChapterId, PageId, SessionKey};
use webtoon_session::model::chapter::{ChapterDescriptor, PageDescriptor};
use webtoon_session::progress::ProgressSync;
use webtoon_session::scheduler::PageScheduler;
use webtoon_session::window::{ReadingWindowStore, WorkMeta};

/// Drive the reading-session engine over a synthetic work.
#[derive(Parser, Debug)]
#[command(name = "session-cli", about = "Demo harness for the webtoon reading-session engine")]
struct Args {
    /// Number of chapters in the synthetic catalog
    #[arg(long, default_value_t = 6)]
    chapters: u32,

    /// Pages per chapter
    #[arg(long, default_value_t = 24)]
    pages_per_chapter: u32,

    /// How many pages to advance the cursor by, per step
    #[arg(long, default_value_t = 3)]
    step: u32,

    /// How many steps to simulate
    #[arg(long, default_value_t = 20)]
    steps: u32,
}

/// An in-memory catalog standing in for a real source integration.
struct SyntheticCatalog {
    chapters: Vec<ChapterDescriptor>,
    pages: HashMap<ChapterId, Vec<PageDescriptor>>,
}

impl SyntheticCatalog {
    fn build(chapter_count: u32, pages_per_chapter: u32) -> Self {
        let mut chapters = Vec::new();
        let mut pages = HashMap::new();
        for i in 0..chapter_count {
            let chapter_id = ChapterId::new(format!("ch{i}"));
            chapters.push(ChapterDescriptor {
                chapter_id: chapter_id.clone(),
                position: i,
                numeric_label: Some(i as f64),
                title: Some(format!("Chapter {i}")),
                source_url: format!("https://example.invalid/work/{i}"),
            });
            let chapter_pages = (0..pages_per_chapter)
                .map(|p| PageDescriptor {
                    chapter_id: chapter_id.clone(),
                    page_index: p,
                    image_url: format!("https://example.invalid/work/{i}/{p}.jpg"),
                    headers: None,
                    size_hint: None,
                })
                .collect();
            pages.insert(chapter_id, chapter_pages);
        }
        Self { chapters, pages }
    }
}

impl CatalogClient for SyntheticCatalog {
    fn fetch_chapters(&self, _work_id: &str) -> webtoon_session::core::Result<Vec<ChapterDescriptor>> {
        Ok(self.chapters.clone())
    }

    fn fetch_pages(&self, chapter_id: &ChapterId) -> webtoon_session::core::Result<Vec<PageDescriptor>> {
        self.pages
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| webtoon_session::core::Error::not_found(format!("no such chapter: {chapter_id}")))
    }
}

/// Synthesizes a minimal valid PNG instead of hitting the network, so the
/// cache's header-only dimension decode has something real to read.
struct SyntheticHttp;

impl HttpClient for SyntheticHttp {
    fn get(&self, _url: &str, _headers: Option<&HashMap<String, String>>) -> webtoon_session::core::Result<HttpResponse> {
        Ok(HttpResponse { status: 200, body: minimal_png(800, 1200) })
    }
}

fn minimal_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn upsert_progress(&self, snapshot: &ProgressSnapshot) {
        println!("  progress  -> {}::{} ({:?}/{:?})", snapshot.chapter_id, snapshot.page_index, snapshot.page_index, snapshot.total_pages);
    }
    fn upsert_history(&self, _snapshot: &ProgressSnapshot) {}
    fn insert_timeline_event(&self, event: &TimelineEvent) {
        println!("  timeline  -> entered {}", event.chapter_id);
    }
}

#[tokio::main]
async fn main() {
    webtoon_session::init();
    let args = Args::parse();

    let catalog = Arc::new(SyntheticCatalog::build(args.chapters, args.pages_per_chapter));
    let cache_root = std::env::temp_dir().join("webtoon-session-demo");
    let cache = Arc::new(
        ImageCache::new(cache_root, Arc::new(SyntheticHttp), Arc::new(StdFileSystem), Arc::new(ImageSizeDecoder))
            .expect("failed to initialize cache directory"),
    );

    let scheduler = Arc::new(PageScheduler::new(SchedulerConfig::default(), cache));

    let window = Arc::new(ReadingWindowStore::new(3));
    let chapters = catalog.fetch_chapters("demo-work").unwrap();
    let first_chapter = chapters[0].clone();
    let first_pages = catalog.fetch_pages(&first_chapter.chapter_id).unwrap();

    window.initialize_session(
        SessionKey::random(),
        WorkMeta { source_id: "demo-source".into(), work_id: "demo-work".into(), title: "Demo Work".into(), thumbnail_url: None },
        chapters,
        first_chapter,
        first_pages,
        0,
    );

    let progress = ProgressSync::new(Arc::new(StdoutProgressSink), None, 50, 5000);
    let printed_ready = Arc::new(AtomicBool::new(false));
    {
        let printed_ready = printed_ready.clone();
        scheduler.subscribe(Arc::new(move || {
            printed_ready.store(true, Ordering::SeqCst);
        }));
    }

    sync_scheduler_from_window(&scheduler, &window);

    println!("simulating {} cursor steps over {} chapters...", args.steps, args.chapters);
    let mut next_index = 0usize;
    for step in 0..args.steps {
        window.set_flat_index(next_index);
        window.prune_window();

        let mut after = window.snapshot();
        if after.current_chapter_id.is_none() {
            // Landed on a chapter-transition marker; step past it.
            next_index += 1;
            window.set_flat_index(next_index);
            after = window.snapshot();
        }
        let Some(landed) = after.current_flat_index else { break };
        next_index = landed + args.step as usize;
        sync_scheduler_from_window(&scheduler, &window);

        if let (Some(chapter_id), Some(page_index)) = (after.current_chapter_id.clone(), after.current_page_index) {
            progress.on_cursor_changed(ProgressSnapshot {
                source_id: "demo-source".into(),
                work_id: "demo-work".into(),
                chapter_id,
                page_index,
                total_pages: None,
            });
        }

        // Lazily pull in the next chapter once we're near the tail of the window.
        if after.flat_pages.len().saturating_sub(after.current_flat_index.unwrap_or(0)) < args.pages_per_chapter as usize {
            if let Some(current_chapter) = &after.current_chapter_id {
                if let Some(next) = webtoon_session::flow::resolve_next(&window.chapters(), current_chapter) {
                    if let Ok(pages) = catalog.fetch_pages(&next.chapter_id) {
                        window.append_chapter(next, pages);
                        sync_scheduler_from_window(&scheduler, &window);
                    }
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let stats = scheduler.snapshot();
        println!(
            "step {step:>3}  cursor={:?}/{:?}  ready={} cancelled={} deprioritized={}",
            after.current_chapter_id,
            after.current_page_index,
            stats.pages.values().filter(|s| matches!(s, webtoon_session::scheduler::PageRuntimeState::Ready { .. })).count(),
            stats.cancelled,
            stats.deprioritized,
        );
    }

    progress.flush_now();
    scheduler.dispose();
}

/// Push the window store's currently loaded pages and cursor into the
/// scheduler — the glue a host app's session controller owns (spec §5:
/// "task set update from store → scheduler").
fn sync_scheduler_from_window(scheduler: &PageScheduler, window: &ReadingWindowStore) {
    let snapshot = window.snapshot();
    let mut tasks = HashMap::new();
    let mut chapter_order = Vec::new();
    for chapter in &snapshot.loaded_chapters {
        chapter_order.push(chapter.chapter_id().clone());
        for page in chapter.pages.iter() {
            tasks.insert(PageId::new(chapter.chapter_id().clone(), page.page_index), page.clone());
        }
    }
    let full_catalog_order: Vec<ChapterId> = window.chapters().iter().map(|c| c.chapter_id.clone()).collect();
    scheduler.update_tasks(tasks);
    scheduler.set_chapter_order(if full_catalog_order.is_empty() { chapter_order } else { full_catalog_order });
    if let (Some(chapter_id), Some(page_index)) = (snapshot.current_chapter_id, snapshot.current_page_index) {
        scheduler.set_cursor(chapter_id, page_index);
    }
}

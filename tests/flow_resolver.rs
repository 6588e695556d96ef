//! End-to-end chapter-flow tests: the resolver wired to a real
//! `ReadingWindowStore`, fetching through a fake catalog collaborator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use webtoon_session::cache::{ImageCache, ImageSizeDecoder, StdFileSystem};
use webtoon_session::collaborators::{CatalogClient, HttpClient, HttpResponse};
use webtoon_session::core::config::SchedulerConfig;
use webtoon_session::core::{ChapterId, SessionKey};
use webtoon_session::flow::ChapterFlowResolver;
use webtoon_session::model::chapter::{ChapterDescriptor, PageDescriptor};
use webtoon_session::scheduler::PageScheduler;
use webtoon_session::window::{ReadingWindowStore, WorkMeta};

struct DeadHttp;

impl HttpClient for DeadHttp {
    fn get(&self, _url: &str, _headers: Option<&HashMap<String, String>>) -> webtoon_session::core::Result<HttpResponse> {
        Err(webtoon_session::core::Error::invalid_input("no network in tests"))
    }
}

fn test_scheduler() -> Arc<PageScheduler> {
    let root = tempfile::tempdir().unwrap().keep();
    let cache = Arc::new(
        ImageCache::new(root, Arc::new(DeadHttp), Arc::new(StdFileSystem), Arc::new(ImageSizeDecoder)).unwrap(),
    );
    Arc::new(PageScheduler::new(SchedulerConfig::default(), cache))
}

struct FakeCatalog {
    chapters: Vec<ChapterDescriptor>,
    pages: HashMap<ChapterId, Vec<PageDescriptor>>,
    fetch_calls: AtomicUsize,
}

impl CatalogClient for FakeCatalog {
    fn fetch_chapters(&self, _work_id: &str) -> webtoon_session::core::Result<Vec<ChapterDescriptor>> {
        Ok(self.chapters.clone())
    }

    fn fetch_pages(&self, chapter_id: &ChapterId) -> webtoon_session::core::Result<Vec<PageDescriptor>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| webtoon_session::core::Error::not_found(format!("no such chapter: {chapter_id}")))
    }
}

fn chapter(id: &str, position: u32) -> ChapterDescriptor {
    ChapterDescriptor {
        chapter_id: ChapterId::new(id),
        position,
        numeric_label: Some(position as f64),
        title: None,
        source_url: String::new(),
    }
}

fn pages(chapter_id: &str, count: u32) -> Vec<PageDescriptor> {
    (0..count)
        .map(|page_index| PageDescriptor {
            chapter_id: ChapterId::new(chapter_id),
            page_index,
            image_url: format!("https://x/{chapter_id}/{page_index}.jpg"),
            headers: None,
            size_hint: None,
        })
        .collect()
}

fn build(chapters: Vec<ChapterDescriptor>) -> (Arc<FakeCatalog>, Arc<ReadingWindowStore>) {
    let mut page_map = HashMap::new();
    for c in &chapters {
        page_map.insert(c.chapter_id.clone(), pages(c.chapter_id.as_str(), 5));
    }
    let catalog = Arc::new(FakeCatalog { chapters: chapters.clone(), pages: page_map, fetch_calls: AtomicUsize::new(0) });
    let store = Arc::new(ReadingWindowStore::new(3));
    store.initialize_session(
        SessionKey::random(),
        WorkMeta::default(),
        chapters.clone(),
        chapters[0].clone(),
        pages(chapters[0].chapter_id.as_str(), 5),
        4,
    );
    (catalog, store)
}

fn resolver(catalog: Arc<FakeCatalog>, store: Arc<ReadingWindowStore>) -> ChapterFlowResolver {
    ChapterFlowResolver::new(catalog, store, test_scheduler())
}

#[tokio::test]
async fn load_next_appends_the_chapter_and_lands_cursor_on_its_first_page() {
    let (catalog, store) = build(vec![chapter("ch0", 0), chapter("ch1", 1)]);
    let resolver = resolver(catalog, store.clone());

    resolver.load_next().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch1")));
    assert_eq!(snapshot.current_page_index, Some(0));
    assert!(!snapshot.next_chapter_loading);
    assert!(snapshot.next_chapter_error.is_none());
}

#[tokio::test]
async fn load_previous_prepends_and_lands_cursor_on_its_last_page() {
    let (catalog, store) = build(vec![chapter("ch0", 0), chapter("ch1", 1)]);
    // Move the session's entry chapter to ch1 so `previous` resolves to ch0.
    store.initialize_session(
        SessionKey::random(),
        WorkMeta::default(),
        vec![chapter("ch0", 0), chapter("ch1", 1)],
        chapter("ch1", 1),
        pages("ch1", 5),
        0,
    );
    let resolver = resolver(catalog, store.clone());

    resolver.load_previous().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch0")));
    assert_eq!(snapshot.current_page_index, Some(4));
}

#[tokio::test]
async fn load_next_is_a_noop_past_the_last_known_chapter() {
    let (catalog, store) = build(vec![chapter("ch0", 0)]);
    let resolver = resolver(catalog, store.clone());

    resolver.load_next().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.loaded_chapters.len(), 1);
    assert!(!snapshot.next_chapter_loading);
}

#[tokio::test]
async fn concurrent_load_next_calls_dedupe_to_a_single_fetch() {
    let (catalog, store) = build(vec![chapter("ch0", 0), chapter("ch1", 1)]);
    let resolver = Arc::new(resolver(catalog.clone(), store.clone()));

    let a = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.load_next().await }
    });
    let b = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.load_next().await }
    });
    let _ = tokio::join!(a, b);

    // Exactly one of the two concurrent calls should have actually dispatched a fetch.
    assert_eq!(catalog.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn switch_to_chapter_jumps_directly_to_a_non_adjacent_chapter() {
    let (catalog, store) = build(vec![chapter("ch0", 0), chapter("ch1", 1), chapter("ch2", 2)]);
    let resolver = resolver(catalog, store.clone());

    resolver.switch_to_chapter(ChapterId::new("ch2")).await.unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch2")));
    assert_eq!(snapshot.current_page_index, Some(0));
}

#[tokio::test]
async fn switch_to_chapter_errors_on_an_unknown_chapter() {
    let (catalog, store) = build(vec![chapter("ch0", 0)]);
    let resolver = resolver(catalog, store.clone());

    assert!(resolver.switch_to_chapter(ChapterId::new("ch99")).await.is_err());
}

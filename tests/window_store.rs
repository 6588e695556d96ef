//! End-to-end reading-window store tests driving the public API the way a
//! host session controller would, across multiple real chapters.

use webtoon_session::core::{ChapterId, SessionKey};
use webtoon_session::model::chapter::{ChapterDescriptor, PageDescriptor};
use webtoon_session::window::{ReadingWindowStore, WorkMeta};

fn chapter(id: &str, position: u32) -> ChapterDescriptor {
    ChapterDescriptor {
        chapter_id: ChapterId::new(id),
        position,
        numeric_label: Some(position as f64),
        title: Some(id.to_string()),
        source_url: format!("https://x/{id}"),
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

fn meta() -> WorkMeta {
    WorkMeta { source_id: "src".into(), work_id: "work".into(), title: "Demo Work".into(), thumbnail_url: None }
}

#[test]
fn reading_through_three_chapters_keeps_the_window_bounded_and_cursor_coherent() {
    let store = ReadingWindowStore::new(2);
    let catalog = vec![chapter("ch0", 0), chapter("ch1", 1), chapter("ch2", 2)];

    store.initialize_session(SessionKey::random(), meta(), catalog, chapter("ch0", 0), pages("ch0", 5), 3);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch0")));
    assert_eq!(snapshot.current_page_index, Some(3));

    store.append_chapter_atomic(chapter("ch1", 1), pages("ch1", 5), 0);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch1")));
    assert_eq!(snapshot.current_page_index, Some(0));
    assert_eq!(snapshot.loaded_chapters.len(), 2);

    store.append_chapter_atomic(chapter("ch2", 2), pages("ch2", 5), 0);
    store.prune_window();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.loaded_chapters.len(), 2, "window should have pruned ch0 once cursor moved past it");
    assert_eq!(
        snapshot.loaded_chapters.iter().map(|c| c.chapter_id().clone()).collect::<Vec<_>>(),
        vec![ChapterId::new("ch1"), ChapterId::new("ch2")],
    );
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch2")));
}

#[test]
fn prepending_a_chapter_for_backward_navigation_lands_cursor_on_its_last_page() {
    let store = ReadingWindowStore::new(3);
    let catalog = vec![chapter("ch0", 0), chapter("ch1", 1)];
    store.initialize_session(SessionKey::random(), meta(), catalog, chapter("ch1", 1), pages("ch1", 4), 0);

    store.prepend_chapter_atomic(chapter("ch0", 0), pages("ch0", 7));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("ch0")));
    assert_eq!(snapshot.current_page_index, Some(6));
    assert_eq!(snapshot.loaded_chapters[0].chapter_id(), &ChapterId::new("ch0"));
}

#[test]
fn reinitializing_a_session_discards_the_previous_window_entirely() {
    let store = ReadingWindowStore::new(3);
    store.initialize_session(
        SessionKey::random(),
        meta(),
        vec![chapter("ch0", 0)],
        chapter("ch0", 0),
        pages("ch0", 3),
        0,
    );
    assert_eq!(store.snapshot().loaded_chapters.len(), 1);

    store.initialize_session(
        SessionKey::random(),
        meta(),
        vec![chapter("other0", 0)],
        chapter("other0", 0),
        pages("other0", 9),
        4,
    );

    let snapshot = store.snapshot();
    assert_eq!(snapshot.loaded_chapters.len(), 1);
    assert_eq!(snapshot.current_chapter_id, Some(ChapterId::new("other0")));
    assert_eq!(snapshot.current_page_index, Some(4));
}

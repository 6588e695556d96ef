//! Reading-window store (spec §4.3)

use crate::core::{ChapterId, SessionKey};
use crate::model::chapter::{ChapterDescriptor, LoadedChapter, PageDescriptor};
use crate::model::projection::{build_projection, find_flat_index, ProjectionItem};
use parking_lot::Mutex;

/// Identifying metadata for the work being read (spec §4.3.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkMeta {
    /// Source id
    pub source_id: String,
    /// Work id
    pub work_id: String,
    /// Display title
    pub title: String,
    /// Thumbnail URL, if any
    pub thumbnail_url: Option<String>,
}

/// Immutable view of the store's state, returned by [`ReadingWindowStore::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct WindowSnapshot {
    /// Session identity, if a session is active
    pub session_key: Option<SessionKey>,
    /// Work metadata, if a session is active
    pub meta: Option<WorkMeta>,
    /// Ordered loaded chapters
    pub loaded_chapters: Vec<LoadedChapter>,
    /// Derived flat projection
    pub flat_pages: Vec<ProjectionItem>,
    /// Current position in `flat_pages`
    pub current_flat_index: Option<usize>,
    /// Current chapter, mirrors `flat_pages[current_flat_index]`
    pub current_chapter_id: Option<ChapterId>,
    /// Current page index within `current_chapter_id`
    pub current_page_index: Option<u32>,
    /// Whether a next-chapter fetch is in flight
    pub next_chapter_loading: bool,
    /// Last next-chapter fetch error, if any
    pub next_chapter_error: Option<String>,
    /// Whether a previous-chapter fetch is in flight
    pub previous_chapter_loading: bool,
    /// Last previous-chapter fetch error, if any
    pub previous_chapter_error: Option<String>,
}

struct Inner {
    session_key: Option<SessionKey>,
    meta: Option<WorkMeta>,
    chapters: Vec<ChapterDescriptor>,
    loaded_chapters: Vec<LoadedChapter>,
    flat_pages: Vec<ProjectionItem>,
    current_flat_index: Option<usize>,
    current_chapter_id: Option<ChapterId>,
    current_page_index: Option<u32>,
    next_chapter_loading: bool,
    next_chapter_error: Option<String>,
    previous_chapter_loading: bool,
    previous_chapter_error: Option<String>,
    max_window: usize,
}

impl Inner {
    fn empty(max_window: usize) -> Self {
        Self {
            session_key: None,
            meta: None,
            chapters: Vec::new(),
            loaded_chapters: Vec::new(),
            flat_pages: Vec::new(),
            current_flat_index: None,
            current_chapter_id: None,
            current_page_index: None,
            next_chapter_loading: false,
            next_chapter_error: None,
            previous_chapter_loading: false,
            previous_chapter_error: None,
            max_window,
        }
    }

    fn recompute_projection(&mut self) {
        self.flat_pages = build_projection(&self.loaded_chapters);
    }

    /// Publish the cursor from a (chapter_id, page_index) pair, remapping
    /// through the just-recomputed projection; falls back to the numeric
    /// flat index clamped to the new length if the pair is gone.
    fn remap_cursor(&mut self, want: Option<(ChapterId, u32)>, fallback_flat_index: Option<usize>) {
        let resolved = want.as_ref().and_then(|(chapter_id, page_index)| {
            find_flat_index(&self.flat_pages, chapter_id, *page_index)
        });

        let index = resolved.or_else(|| {
            fallback_flat_index.map(|idx| idx.min(self.flat_pages.len().saturating_sub(1)))
        });

        self.publish_cursor(index);
    }

    fn publish_cursor(&mut self, flat_index: Option<usize>) {
        match flat_index.and_then(|idx| self.flat_pages.get(idx).map(|item| (idx, item))) {
            Some((idx, ProjectionItem::Page(page))) => {
                self.current_flat_index = Some(idx);
                self.current_chapter_id = Some(page.chapter_id.clone());
                self.current_page_index = Some(page.page_index);
            }
            _ => {
                self.current_flat_index = None;
                self.current_chapter_id = None;
                self.current_page_index = None;
            }
        }
    }

    fn position_of(&self, chapter_id: &ChapterId) -> Option<usize> {
        self.loaded_chapters.iter().position(|c| c.chapter_id() == chapter_id)
    }
}

/// Maintains the ordered loaded-chapter list, the cursor, and the derived
/// flat projection, such that the two are never observably out of sync
/// (spec §4.3).
pub struct ReadingWindowStore {
    inner: Mutex<Inner>,
}

impl ReadingWindowStore {
    /// Construct an empty store pruning to at most `max_window` loaded chapters.
    pub fn new(max_window: usize) -> Self {
        Self { inner: Mutex::new(Inner::empty(max_window)) }
    }

    /// Replace state wholesale with a freshly opened session (spec §4.3.2).
    pub fn initialize_session(
        &self,
        session_key: SessionKey,
        meta: WorkMeta,
        catalog: Vec<ChapterDescriptor>,
        initial_chapter: ChapterDescriptor,
        initial_pages: Vec<PageDescriptor>,
        initial_page_index: u32,
    ) {
        let mut inner = self.inner.lock();
        let max_window = inner.max_window;
        *inner = Inner::empty(max_window);
        inner.session_key = Some(session_key);
        inner.meta = Some(meta);
        inner.chapters = catalog;
        let chapter_id = initial_chapter.chapter_id.clone();
        let clamped = clamp_page_index(&initial_pages, initial_page_index);
        inner.loaded_chapters.push(LoadedChapter::new(initial_chapter, initial_pages));
        inner.recompute_projection();
        inner.remap_cursor(Some((chapter_id, clamped)), Some(0));
    }

    /// Append to the tail of `loaded_chapters`; no-op if already loaded with
    /// an unchanged page set, otherwise replaces pages and remaps the cursor
    /// (spec §4.3.2).
    pub fn append_chapter(&self, chapter: ChapterDescriptor, pages: Vec<PageDescriptor>) {
        let mut inner = self.inner.lock();
        let chapter_id = chapter.chapter_id.clone();

        if let Some(pos) = inner.position_of(&chapter_id) {
            if inner.loaded_chapters[pos].pages.as_ref() == &pages {
                return;
            }
            let previous_cursor =
                inner.current_chapter_id.clone().zip(inner.current_page_index);
            let previous_flat_index = inner.current_flat_index;
            inner.loaded_chapters[pos] = LoadedChapter::new(chapter, pages);
            inner.recompute_projection();
            inner.remap_cursor(previous_cursor, previous_flat_index);
            return;
        }

        inner.loaded_chapters.push(LoadedChapter::new(chapter, pages));
        let previous_cursor = inner.current_chapter_id.clone().zip(inner.current_page_index);
        let previous_flat_index = inner.current_flat_index;
        inner.recompute_projection();
        inner.remap_cursor(previous_cursor, previous_flat_index);
    }

    /// Append and atomically move the cursor to `target_page_index` of the
    /// new chapter (spec §4.3.2).
    pub fn append_chapter_atomic(
        &self,
        chapter: ChapterDescriptor,
        pages: Vec<PageDescriptor>,
        target_page_index: u32,
    ) {
        let mut inner = self.inner.lock();
        let chapter_id = chapter.chapter_id.clone();
        let clamped = clamp_page_index(&pages, target_page_index);
        if let Some(pos) = inner.position_of(&chapter_id) {
            inner.loaded_chapters[pos] = LoadedChapter::new(chapter, pages);
        } else {
            inner.loaded_chapters.push(LoadedChapter::new(chapter, pages));
        }
        let fallback = inner.current_flat_index;
        inner.recompute_projection();
        inner.remap_cursor(Some((chapter_id, clamped)), fallback);
    }

    /// Insert at the head, cursor moves to the last page of the newly
    /// prepended chapter (spec §4.3.2, reading-backward continuity).
    pub fn prepend_chapter_atomic(&self, chapter: ChapterDescriptor, pages: Vec<PageDescriptor>) {
        let mut inner = self.inner.lock();
        let chapter_id = chapter.chapter_id.clone();
        let last_page_index = pages.len().saturating_sub(1) as u32;
        inner.loaded_chapters.insert(0, LoadedChapter::new(chapter, pages));
        inner.recompute_projection();
        inner.remap_cursor(Some((chapter_id, last_page_index)), Some(0));
    }

    /// Retain at most `max_window` loaded chapters, only when the cursor's
    /// chapter is the tail (or isn't loaded at all); remap the cursor
    /// (spec §4.3.2).
    pub fn prune_window(&self) {
        let mut inner = self.inner.lock();
        if inner.loaded_chapters.len() <= inner.max_window {
            return;
        }

        let cursor_is_tail_or_unknown = match &inner.current_chapter_id {
            Some(chapter_id) => inner.loaded_chapters.last().map(|c| c.chapter_id()) == Some(chapter_id),
            None => true,
        };
        if !cursor_is_tail_or_unknown {
            return;
        }

        let previous_cursor = inner.current_chapter_id.clone().zip(inner.current_page_index);
        let previous_flat_index = inner.current_flat_index;

        let keep_from = inner.loaded_chapters.len() - inner.max_window;
        inner.loaded_chapters.drain(0..keep_from);
        inner.recompute_projection();
        inner.remap_cursor(previous_cursor, previous_flat_index);
    }

    /// Set the cursor directly by flat index, clamped to range; no
    /// projection recomputation.
    pub fn set_flat_index(&self, index: usize) {
        let mut inner = self.inner.lock();
        if inner.flat_pages.is_empty() {
            inner.publish_cursor(None);
            return;
        }
        let clamped = index.min(inner.flat_pages.len() - 1);
        inner.publish_cursor(Some(clamped));
    }

    /// Record that a next-chapter fetch started/finished, with an optional error.
    pub fn set_next_chapter_loading(&self, loading: bool, error: Option<String>) {
        let mut inner = self.inner.lock();
        inner.next_chapter_loading = loading;
        inner.next_chapter_error = error;
    }

    /// Record that a previous-chapter fetch started/finished, with an optional error.
    pub fn set_previous_chapter_loading(&self, loading: bool, error: Option<String>) {
        let mut inner = self.inner.lock();
        inner.previous_chapter_loading = loading;
        inner.previous_chapter_error = error;
    }

    /// The static catalog, for prev/next resolution.
    pub fn chapters(&self) -> Vec<ChapterDescriptor> {
        self.inner.lock().chapters.clone()
    }

    /// Return to the empty initial state (spec §4.3.2).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let max_window = inner.max_window;
        *inner = Inner::empty(max_window);
    }

    /// Immutable snapshot of the current state.
    pub fn snapshot(&self) -> WindowSnapshot {
        let inner = self.inner.lock();
        WindowSnapshot {
            session_key: inner.session_key.clone(),
            meta: inner.meta.clone(),
            loaded_chapters: inner.loaded_chapters.clone(),
            flat_pages: inner.flat_pages.clone(),
            current_flat_index: inner.current_flat_index,
            current_chapter_id: inner.current_chapter_id.clone(),
            current_page_index: inner.current_page_index,
            next_chapter_loading: inner.next_chapter_loading,
            next_chapter_error: inner.next_chapter_error.clone(),
            previous_chapter_loading: inner.previous_chapter_loading,
            previous_chapter_error: inner.previous_chapter_error.clone(),
        }
    }
}

fn clamp_page_index(pages: &[PageDescriptor], page_index: u32) -> u32 {
    let max_index = pages.len().saturating_sub(1) as u32;
    page_index.min(max_index)
}

//! Chapter flow resolver (spec §4.4)

use crate::collaborators::CatalogClient;
use crate::core::ChapterId;
use crate::model::chapter::ChapterDescriptor;
use crate::scheduler::PageScheduler;
use crate::window::ReadingWindowStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Deterministically resolve the immediate next chapter after `current_id`
/// (spec §4.4.1): numeric-label ordering when the current chapter has one,
/// never falling back to positional ordering if numeric search comes up empty.
pub fn resolve_next(chapters: &[ChapterDescriptor], current_id: &ChapterId) -> Option<ChapterDescriptor> {
    let current = chapters.iter().find(|c| &c.chapter_id == current_id)?;
    if let Some(label) = current.numeric_label {
        return chapters
            .iter()
            .filter(|c| c.numeric_label.is_some_and(|l| l > label))
            .min_by(|a, b| a.numeric_label.unwrap().partial_cmp(&b.numeric_label.unwrap()).unwrap())
            .cloned();
    }
    chapters
        .iter()
        .filter(|c| c.chapter_id != *current_id && c.position > current.position)
        .min_by_key(|c| c.position)
        .cloned()
}

/// Deterministically resolve the immediate previous chapter before
/// `current_id` (spec §4.4.1).
pub fn resolve_previous(chapters: &[ChapterDescriptor], current_id: &ChapterId) -> Option<ChapterDescriptor> {
    let current = chapters.iter().find(|c| &c.chapter_id == current_id)?;
    if let Some(label) = current.numeric_label {
        return chapters
            .iter()
            .filter(|c| c.numeric_label.is_some_and(|l| l < label))
            .max_by(|a, b| a.numeric_label.unwrap().partial_cmp(&b.numeric_label.unwrap()).unwrap())
            .cloned();
    }
    chapters
        .iter()
        .filter(|c| c.chapter_id != *current_id && c.position < current.position)
        .max_by_key(|c| c.position)
        .cloned()
}

/// Drives lazy population of loaded chapters in the window store, using
/// [`resolve_next`]/[`resolve_previous`] over the store's static catalog
/// (spec §4.4).
pub struct ChapterFlowResolver {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<ReadingWindowStore>,
    scheduler: Arc<PageScheduler>,
    next_in_flight: AtomicBool,
    previous_in_flight: AtomicBool,
}

impl ChapterFlowResolver {
    /// Build a resolver over `store`'s catalog, fetching pages through
    /// `catalog` and moving `scheduler`'s cursor on direct chapter jumps.
    pub fn new(catalog: Arc<dyn CatalogClient>, store: Arc<ReadingWindowStore>, scheduler: Arc<PageScheduler>) -> Self {
        Self {
            catalog,
            store,
            scheduler,
            next_in_flight: AtomicBool::new(false),
            previous_in_flight: AtomicBool::new(false),
        }
    }

    /// The `switch_to_chapter(chapter_id)` UI command (spec §6.2): fetch the
    /// target chapter's pages if not already loaded, land the window cursor
    /// on its first page, and move the scheduler's cursor with
    /// `CancelReason::ChapterSwitch` semantics rather than an ordinary
    /// recompute.
    pub async fn switch_to_chapter(&self, chapter_id: ChapterId) -> crate::core::Result<()> {
        let descriptor = self
            .store
            .chapters()
            .into_iter()
            .find(|c| c.chapter_id == chapter_id)
            .ok_or_else(|| crate::core::Error::not_found(format!("unknown chapter {chapter_id}")))?;

        let catalog = self.catalog.clone();
        let fetch_id = chapter_id.clone();
        let pages = tokio::task::spawn_blocking(move || catalog.fetch_pages(&fetch_id))
            .await
            .map_err(|e| crate::core::Error::invalid_input(e.to_string()))??;

        self.store.append_chapter_atomic(descriptor, pages, 0);
        self.scheduler.on_chapter_switch(chapter_id);
        Ok(())
    }

    /// Fetch and append the chapter after the store's current chapter, atomically
    /// landing the cursor on its first page. Concurrent calls are deduplicated.
    pub async fn load_next(&self) {
        if self.next_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.store.set_next_chapter_loading(true, None);

        let outcome = self.resolve_and_fetch(resolve_next).await;
        match outcome {
            Some(Ok((descriptor, pages))) => {
                self.store.append_chapter_atomic(descriptor, pages, 0);
                self.store.set_next_chapter_loading(false, None);
            }
            Some(Err(message)) => {
                warn!(error = %message, "next chapter fetch failed");
                self.store.set_next_chapter_loading(false, Some(message));
            }
            None => self.store.set_next_chapter_loading(false, None),
        }

        self.next_in_flight.store(false, Ordering::SeqCst);
    }

    /// Fetch and prepend the chapter before the store's current chapter,
    /// landing the cursor on its last page. Concurrent calls are deduplicated.
    pub async fn load_previous(&self) {
        if self.previous_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.store.set_previous_chapter_loading(true, None);

        let outcome = self.resolve_and_fetch(resolve_previous).await;
        match outcome {
            Some(Ok((descriptor, pages))) => {
                self.store.prepend_chapter_atomic(descriptor, pages);
                self.store.set_previous_chapter_loading(false, None);
            }
            Some(Err(message)) => {
                warn!(error = %message, "previous chapter fetch failed");
                self.store.set_previous_chapter_loading(false, Some(message));
            }
            None => self.store.set_previous_chapter_loading(false, None),
        }

        self.previous_in_flight.store(false, Ordering::SeqCst);
    }

    async fn resolve_and_fetch(
        &self,
        resolve: fn(&[ChapterDescriptor], &ChapterId) -> Option<ChapterDescriptor>,
    ) -> Option<Result<(ChapterDescriptor, Vec<crate::model::chapter::PageDescriptor>), String>> {
        let snapshot = self.store.snapshot();
        let current_id = snapshot.current_chapter_id?;
        let chapters = self.store.chapters();
        let neighbor = resolve(&chapters, &current_id)?;

        let catalog = self.catalog.clone();
        let fetch_id = neighbor.chapter_id.clone();
        let pages = tokio::task::spawn_blocking(move || catalog.fetch_pages(&fetch_id))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));

        Some(pages.map(|pages| (neighbor, pages)))
    }
}

//! The flat projection consumed by the UI renderer (spec §3.1, §4.3.3)

use crate::core::ids::{ChapterId, PageId};
use crate::model::chapter::{LoadedChapter, PageDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A single page, flattened out of its owning chapter for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatPage {
    /// Page identity
    pub page_id: PageId,
    /// Owning chapter
    pub chapter_id: ChapterId,
    /// This chapter's position among currently loaded chapters (0-based)
    pub chapter_ordinal: usize,
    /// Index of this page within its chapter
    pub page_index: u32,
    /// Total pages in the owning chapter
    pub total_pages_in_chapter: u32,
    /// Stable key: `chapter_id::page_index::image_url`
    pub projection_key: String,
    /// Remote image URL
    pub image_url: String,
    /// Request headers, if any
    #[serde(skip)]
    pub headers: Option<Arc<HashMap<String, String>>>,
}

/// Inserted between two adjacent loaded chapters to carry the visual hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMarker {
    /// Chapter the reader is leaving
    pub from_chapter_id: ChapterId,
    /// Title of the chapter the reader is leaving
    pub from_title: Option<String>,
    /// Chapter the reader is entering
    pub to_chapter_id: ChapterId,
    /// Title of the chapter the reader is entering
    pub to_title: Option<String>,
}

/// One element of the flat, ordered projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProjectionItem {
    /// A renderable page
    Page(FlatPage),
    /// A hand-off between two chapters
    Transition(TransitionMarker),
}

fn projection_key(chapter_id: &ChapterId, page: &PageDescriptor) -> String {
    format!("{chapter_id}::{}::{}", page.page_index, page.image_url)
}

/// Rebuild the flat projection whole-cloth from the ordered loaded chapters
/// (spec §3.2: `[pages(ch0), TRANS(ch0→ch1), pages(ch1), ...]`).
///
/// O(Σ pages); deliberately not incremental (spec §9: negligible at
/// `MAX_WINDOW` ≈ 3 chapters of ~30–200 pages each).
pub fn build_projection(loaded_chapters: &[LoadedChapter]) -> Vec<ProjectionItem> {
    let mut items = Vec::new();
    for (ordinal, chapter) in loaded_chapters.iter().enumerate() {
        if ordinal > 0 {
            let prev = &loaded_chapters[ordinal - 1];
            items.push(ProjectionItem::Transition(TransitionMarker {
                from_chapter_id: prev.chapter_id().clone(),
                from_title: prev.descriptor.title.clone(),
                to_chapter_id: chapter.chapter_id().clone(),
                to_title: chapter.descriptor.title.clone(),
            }));
        }
        let total_pages = chapter.pages.len() as u32;
        for page in chapter.pages.iter() {
            items.push(ProjectionItem::Page(FlatPage {
                page_id: PageId::new(chapter.chapter_id().clone(), page.page_index),
                chapter_id: chapter.chapter_id().clone(),
                chapter_ordinal: ordinal,
                page_index: page.page_index,
                total_pages_in_chapter: total_pages,
                projection_key: projection_key(chapter.chapter_id(), page),
                image_url: page.image_url.clone(),
                headers: page.headers.clone(),
            }));
        }
    }
    items
}

/// Find the flat index of the FlatPage matching `(chapter_id, page_index)`, if present.
pub fn find_flat_index(
    items: &[ProjectionItem],
    chapter_id: &ChapterId,
    page_index: u32,
) -> Option<usize> {
    items.iter().position(|item| match item {
        ProjectionItem::Page(p) => &p.chapter_id == chapter_id && p.page_index == page_index,
        ProjectionItem::Transition(_) => false,
    })
}

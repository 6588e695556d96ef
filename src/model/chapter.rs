//! Immutable descriptors fetched from the catalog collaborator (spec §3.1)

use crate::core::ids::ChapterId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A chapter as known to the catalog; immutable within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    /// Stable identity
    pub chapter_id: ChapterId,
    /// Ordinal position within the work, used for prev/next resolution fallback
    pub position: u32,
    /// Numeric label (e.g. "12.5"), if the source exposes one
    pub numeric_label: Option<f64>,
    /// Human-facing title
    pub title: Option<String>,
    /// Source URL for this chapter's page list
    pub source_url: String,
}

/// A single page within a chapter; immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// Owning chapter
    pub chapter_id: ChapterId,
    /// Zero-based index within the chapter
    pub page_index: u32,
    /// Remote image URL
    pub image_url: String,
    /// Optional request headers (e.g. referer tokens some sources require)
    #[serde(skip)]
    pub headers: Option<Arc<HashMap<String, String>>>,
    /// Optional (width, height) hint from the catalog, before decode
    pub size_hint: Option<(u32, u32)>,
}

/// A chapter paired with its ordered page list; present in the store iff
/// the chapter is in the reading window.
#[derive(Debug, Clone)]
pub struct LoadedChapter {
    /// The chapter's descriptor
    pub descriptor: ChapterDescriptor,
    /// Ordered pages belonging to this chapter
    pub pages: Arc<Vec<PageDescriptor>>,
}

impl LoadedChapter {
    /// Build a loaded chapter from a descriptor and its pages
    pub fn new(descriptor: ChapterDescriptor, pages: Vec<PageDescriptor>) -> Self {
        Self { descriptor, pages: Arc::new(pages) }
    }

    /// Chapter id, shorthand for `self.descriptor.chapter_id`
    pub fn chapter_id(&self) -> &ChapterId {
        &self.descriptor.chapter_id
    }
}

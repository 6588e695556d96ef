//! External collaborators (spec §6.1)
//!
//! The engine never talks to the network, the filesystem, or a progress
//! store directly — it drives these traits. Production callers wire in the
//! `reqwest`/`imagesize`/std::fs-backed defaults in [`crate::cache::default_collaborators`];
//! tests wire in in-memory fakes.

use crate::core::{ChapterId, Result};
use crate::model::{ChapterDescriptor, PageDescriptor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Chapter/page catalog (spec §6.1)
pub trait CatalogClient: Send + Sync {
    /// List every chapter of a work
    fn fetch_chapters(&self, work_id: &str) -> Result<Vec<ChapterDescriptor>>;
    /// List every page of a chapter
    fn fetch_pages(&self, chapter_id: &ChapterId) -> Result<Vec<PageDescriptor>>;
}

/// Outcome of an HTTP GET, as the cache needs it.
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

/// Outbound HTTP GET (spec §6.1)
pub trait HttpClient: Send + Sync {
    /// Issue a GET request with optional headers, returning status + bytes.
    /// Transport failures should be surfaced as `Err`, not a synthetic status.
    fn get(&self, url: &str, headers: Option<&HashMap<String, String>>) -> Result<HttpResponse>;
}

/// Filesystem primitives the cache needs (spec §6.1)
pub trait FileSystem: Send + Sync {
    /// Whether a file exists at `path`
    fn exists(&self, path: &Path) -> bool;
    /// Create a directory (and parents) if missing
    fn make_directory(&self, path: &Path) -> std::io::Result<()>;
    /// Write `bytes` to `path`, creating or truncating it
    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
    /// Delete a file; must not fail if it is already gone
    fn delete(&self, path: &Path) -> std::io::Result<()>;
    /// List the files directly inside `path`
    fn read_directory(&self, path: &Path) -> std::io::Result<Vec<PathBuf>>;
}

/// Image-dimension decoder (spec §6.1)
pub trait ImageDecoder: Send + Sync {
    /// Read just enough of the file at `path` to determine its pixel dimensions
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;
}

/// A reading-position snapshot as sent to the progress collaborator (spec §4.5)
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Source id
    pub source_id: String,
    /// Work id
    pub work_id: String,
    /// Active chapter
    pub chapter_id: ChapterId,
    /// Page index within the chapter
    pub page_index: u32,
    /// Total pages in the chapter, if known
    pub total_pages: Option<u32>,
}

/// A timeline event signature, used for the duplicate-guard (spec §4.5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    /// Source id
    pub source_id: String,
    /// Work id
    pub work_id: String,
    /// Active chapter
    pub chapter_id: ChapterId,
    /// Page index within the chapter
    pub page_index: u32,
    /// Total pages in the chapter, if known
    pub total_pages: Option<u32>,
}

/// Fire-and-forget progress collaborator (spec §6.1)
pub trait ProgressSink: Send + Sync {
    /// Upsert the current reading position
    fn upsert_progress(&self, snapshot: &ProgressSnapshot);
    /// Upsert the reading-history entry for this work
    fn upsert_history(&self, snapshot: &ProgressSnapshot);
    /// Record a timeline event (chapter change, background, dispose)
    fn insert_timeline_event(&self, event: &TimelineEvent);
}

/// Optional query-cache invalidation collaborator (spec §6.1)
pub trait QueryCacheInvalidator: Send + Sync {
    /// Invalidate every cached query keyed under one of these prefixes
    fn invalidate(&self, key_prefixes: &[String]);
}

//! Domain identifiers
//!
//! Chapter and page ids are opaque strings handed to us by the catalog
//! collaborator (spec §6.1); we wrap them in newtypes the way the teacher
//! wraps its fixed-size ids, but backed by `Arc<str>` since these ids come
//! from an external, variable-length source rather than being locally
//! generated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies a chapter within a work; stable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChapterId(Arc<str>);

impl ChapterId {
    /// Wrap a raw chapter id
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChapterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChapterId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Identifies a page within a session: `chapter_id::page_index`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId {
    /// Owning chapter
    pub chapter_id: ChapterId,
    /// Zero-based page index within the chapter
    pub page_index: u32,
}

impl PageId {
    /// Construct a page id from its components
    pub fn new(chapter_id: ChapterId, page_index: u32) -> Self {
        Self { chapter_id, page_index }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.chapter_id, self.page_index)
    }
}

/// Opaque session identifier; a new one implies a session boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    /// Build a session key from its (source_id, work_id, entry_chapter_id) triple,
    /// the identity spec §3.3 uses to decide whether a navigation is a new session.
    pub fn from_triple(source_id: &str, work_id: &str, entry_chapter_id: &str) -> Self {
        Self(format!("{source_id}::{work_id}::{entry_chapter_id}").into())
    }

    /// Generate a fresh random session key (used when the host app has none handy)
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_id_displays_as_chapter_double_colon_index() {
        let id = PageId::new(ChapterId::new("ch9"), 3);
        assert_eq!(id.to_string(), "ch9::3");
    }

    #[test]
    fn session_key_from_triple_is_deterministic() {
        let a = SessionKey::from_triple("src", "work", "ch9");
        let b = SessionKey::from_triple("src", "work", "ch9");
        assert_eq!(a, b);
    }
}

//! Content-addressed, per-chapter evictable image cache (spec §4.2)

use crate::cache::naming::{cache_filename, chapter_prefix};
use crate::collaborators::{FileSystem, HttpClient, ImageDecoder};
use crate::core::{CacheError, ChapterId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Decoded, on-disk artifact for exactly one `(chapter_id, url)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// The URL this artifact was fetched from
    pub original_url: String,
    /// Local path on disk
    pub local_path: PathBuf,
    /// Decoded pixel width
    pub width: u32,
    /// Decoded pixel height
    pub height: u32,
    /// Downloaded byte length (supplemented observability, SPEC_FULL §C.2)
    pub byte_length: u64,
}

type FetchKey = (ChapterId, String);
type FetchOutcome = Result<CachedArtifact, CacheError>;

/// Content-addressed on-disk image cache, owned by the scheduler.
pub struct ImageCache {
    root: PathBuf,
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystem>,
    decoder: Arc<dyn ImageDecoder>,
    in_flight: DashMap<FetchKey, broadcast::Sender<FetchOutcome>>,
}

impl ImageCache {
    /// Create a cache rooted at `root`, creating the directory if needed.
    pub fn new(
        root: PathBuf,
        http: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystem>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> std::io::Result<Self> {
        fs.make_directory(&root)?;
        Ok(Self { root, http, fs, decoder, in_flight: DashMap::new() })
    }

    /// Fetch `(chapter_id, url)`, deduplicating concurrent callers for the
    /// same pair (spec §4.2.1).
    pub async fn fetch(
        &self,
        chapter_id: &ChapterId,
        url: &str,
        headers: Option<Arc<HashMap<String, String>>>,
    ) -> FetchOutcome {
        let key: FetchKey = (chapter_id.clone(), url.to_string());

        let mut leader_tx = None;
        let mut rx = {
            let entry = self.in_flight.entry(key.clone()).or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(1);
                leader_tx = Some(tx.clone());
                tx
            });
            entry.subscribe()
        };

        let Some(tx) = leader_tx else {
            return match rx.recv().await {
                Ok(outcome) => outcome,
                Err(_) => Err(CacheError::network("single-flight leader dropped without a result")),
            };
        };

        let outcome = self.fetch_uncoordinated(chapter_id, url, headers).await;
        self.in_flight.remove(&key);
        let _ = tx.send(outcome.clone());
        outcome
    }

    async fn fetch_uncoordinated(
        &self,
        chapter_id: &ChapterId,
        url: &str,
        headers: Option<Arc<HashMap<String, String>>>,
    ) -> FetchOutcome {
        let path = self.root.join(cache_filename(chapter_id, url));

        if self.fs.exists(&path) {
            match self.decoder.dimensions(&path) {
                Ok((width, height)) => {
                    let byte_length = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    crate::system::EngineMetrics::global().record_cache_hit();
                    return Ok(CachedArtifact {
                        original_url: url.to_string(),
                        local_path: path,
                        width,
                        height,
                        byte_length,
                    });
                }
                Err(_) => {
                    let _ = self.fs.delete(&path);
                }
            }
        }

        let response = self
            .http
            .get(url, headers.as_deref())
            .map_err(|_| CacheError::network(format!("transport failure fetching {url}")))?;

        if response.status != 200 {
            return Err(CacheError::http(response.status));
        }

        let byte_length = response.body.len() as u64;
        self.fs
            .write(&path, &response.body)
            .map_err(|e| CacheError::filesystem(e.to_string()))?;

        match self.decoder.dimensions(&path) {
            Ok((width, height)) => {
                crate::system::EngineMetrics::global().record_cache_miss(byte_length);
                Ok(CachedArtifact { original_url: url.to_string(), local_path: path, width, height, byte_length })
            }
            Err(e) => {
                let _ = self.fs.delete(&path);
                Err(CacheError::decode(e.to_string()))
            }
        }
    }

    /// Delete every cached file belonging to `chapter_id`. Idempotent; never
    /// fails loudly. Skips files currently being downloaded for that chapter
    /// (spec §4.2.3).
    pub fn evict_chapter(&self, chapter_id: &ChapterId) {
        let prefix = chapter_prefix(chapter_id);
        let protected: Vec<String> = self
            .in_flight
            .iter()
            .filter(|entry| &entry.key().0 == chapter_id)
            .map(|entry| cache_filename(&entry.key().0, &entry.key().1))
            .collect();

        let Ok(entries) = self.fs.read_directory(&self.root) else { return };
        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if name.starts_with(&prefix) && !protected.contains(&name.to_string()) {
                let _ = self.fs.delete(&path);
            }
        }
    }

    /// Delete the cache root and recreate it empty.
    pub fn clear_all(&self) {
        let Ok(entries) = self.fs.read_directory(&self.root) else { return };
        for path in entries {
            let _ = self.fs.delete(&path);
        }
    }
}

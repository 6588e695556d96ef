//! Lightweight runtime counters for the reading-session engine.
//!
//! The teacher's Prometheus registry is overkill for an embedded engine with
//! no scrape endpoint of its own; atomics exposed through a debug snapshot
//! are what a host app actually wants to log or assert on in tests.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time read of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Pages that reached `Ready`
    pub pages_ready: u64,
    /// Pages that reached a failed attempt (retriable or terminal)
    pub pages_failed: u64,
    /// Pages cancelled (task removal, recompute, or chapter switch)
    pub pages_cancelled: u64,
    /// Cache hits: fetches served from an existing on-disk file
    pub cache_hits: u64,
    /// Cache misses: fetches that performed an HTTP download
    pub cache_misses: u64,
    /// Bytes downloaded over the lifetime of the process
    pub bytes_downloaded: u64,
}

/// Process-wide counters, incremented from the scheduler and cache.
pub struct EngineMetrics {
    pages_ready: AtomicU64,
    pages_failed: AtomicU64,
    pages_cancelled: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl EngineMetrics {
    fn new() -> Self {
        Self {
            pages_ready: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            pages_cancelled: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static EngineMetrics {
        static INSTANCE: Lazy<EngineMetrics> = Lazy::new(EngineMetrics::new);
        &INSTANCE
    }

    /// Record a page reaching `Ready`.
    pub fn record_page_ready(&self) {
        self.pages_ready.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a page failing an attempt.
    pub fn record_page_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a page cancellation.
    pub fn record_page_cancelled(&self) {
        self.pages_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache fetch served from disk.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache fetch that downloaded `byte_length` bytes.
    pub fn record_cache_miss(&self, byte_length: u64) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(byte_length, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_ready: self.pages_ready.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            pages_cancelled: self.pages_cancelled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

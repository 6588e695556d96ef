//! Per-page state machine (spec §4.1.2)

use crate::scheduler::lanes::Lane;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Tagged variant describing one page's progress toward a ready artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum PageRuntimeState {
    /// Newly known, not queued.
    Idle,
    /// Present in exactly one lane queue.
    Queued {
        /// Lane it is queued in
        lane: Lane,
        /// When it was queued
        queued_at: SystemTime,
    },
    /// Dispatched into a worker pool.
    Loading {
        /// Lane it was dispatched from
        lane: Lane,
        /// 1-based attempt counter
        attempt: u32,
        /// When dispatch started
        started_at: SystemTime,
    },
    /// Terminal success.
    Ready {
        /// Local on-disk path
        local_path: PathBuf,
        /// Decoded pixel width
        width: u32,
        /// Decoded pixel height
        height: u32,
        /// Downloaded byte length, surfaced for UI data-usage displays
        byte_length: u64,
        /// When the artifact became ready
        loaded_at: SystemTime,
    },
    /// Failure; may auto-retry depending on `terminal`.
    Error {
        /// Lane the failed attempt was dispatched from
        lane: Lane,
        /// Whether another attempt might succeed
        retriable: bool,
        /// Coarse error kind ("network", "http", "decode", "unknown")
        code: &'static str,
        /// HTTP status code, if applicable
        status_code: Option<u16>,
        /// Attempt number that failed
        attempt: u32,
        /// Human-readable message from the last failure
        last_error: String,
        /// When the automatic retry timer will fire, if one is scheduled
        next_retry_at: Option<SystemTime>,
        /// Whether this error is final (no automatic path back to Queued)
        terminal: bool,
        /// When this failure was recorded
        failed_at: SystemTime,
    },
    /// Deprioritized out of the desired set, or removed from the known task set.
    Cancelled {
        /// Why it was cancelled
        reason: CancelReason,
        /// When it was cancelled
        cancelled_at: SystemTime,
    },
}

/// Why a page transitioned to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// Removed from the known task set via `update_tasks`
    TaskRemoved,
    /// Left the desired set on recompute (cursor/order/config change)
    Recompute,
    /// `on_chapter_switch` proactively demoted/cancelled it
    ChapterSwitch,
}

impl PageRuntimeState {
    /// Whether this state can still be moved by a desired-set recompute
    /// (spec §4.1.4: `Ready` and terminal `Error` are never disturbed).
    pub fn is_disturbable_by_recompute(&self) -> bool {
        match self {
            PageRuntimeState::Ready { .. } => false,
            PageRuntimeState::Error { terminal, .. } => !terminal,
            _ => true,
        }
    }
}

/// Default backoff schedule, milliseconds, used when config supplies none.
pub fn default_backoff() -> Vec<Duration> {
    vec![Duration::from_millis(750), Duration::from_millis(2000)]
}

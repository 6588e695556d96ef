//! Priority lanes (spec §4.1.3)

use serde::{Deserialize, Serialize};

/// Dispatch priority lane. Declaration order is priority order: earlier
/// variants are always drained before later ones within the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lane {
    /// User explicitly retried a failed page
    ManualRetry,
    /// The page currently on screen, or under the reading cursor
    VisibleOrCursor,
    /// Other pages inside the foreground window
    ForegroundWindow,
    /// Remaining pages of the current chapter, beyond the window
    InChapterPrefetch,
    /// Lead-in pages of the next chapter
    NextChapterPrefetch,
}

impl Lane {
    /// All lanes, in dispatch-priority order.
    pub const ALL: [Lane; 5] = [
        Lane::ManualRetry,
        Lane::VisibleOrCursor,
        Lane::ForegroundWindow,
        Lane::InChapterPrefetch,
        Lane::NextChapterPrefetch,
    ];

    /// Index into a 5-slot lane array.
    pub fn index(self) -> usize {
        match self {
            Lane::ManualRetry => 0,
            Lane::VisibleOrCursor => 1,
            Lane::ForegroundWindow => 2,
            Lane::InChapterPrefetch => 3,
            Lane::NextChapterPrefetch => 4,
        }
    }

    /// Whether this lane is dispatched from the foreground worker pool
    /// (spec §4.1.5): everything except the two prefetch lanes.
    pub fn is_foreground(self) -> bool {
        !matches!(self, Lane::InChapterPrefetch | Lane::NextChapterPrefetch)
    }
}

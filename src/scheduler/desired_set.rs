//! Desired-set computation (spec §4.1.4)

use crate::core::config::SchedulerConfig;
use crate::core::{ChapterId, PageId};
use crate::model::chapter::PageDescriptor;
use crate::scheduler::lanes::Lane;
use std::collections::HashMap;

/// The reading cursor: a chapter and a page index within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Chapter the cursor is in
    pub chapter_id: ChapterId,
    /// Page index within that chapter
    pub page_index: u32,
}

/// Highest page index known for `chapter_id` among `tasks`, if any page of
/// that chapter is known.
fn max_index_in_chapter(tasks: &HashMap<PageId, PageDescriptor>, chapter_id: &ChapterId) -> Option<u32> {
    tasks.keys().filter(|id| &id.chapter_id == chapter_id).map(|id| id.page_index).max()
}

/// Compute the desired page_id → lane mapping for the current cursor,
/// chapter order, and task set (spec §4.1.4). Only page_ids present in
/// `tasks` are returned.
pub fn compute_desired_set(
    cursor: &Cursor,
    tasks: &HashMap<PageId, PageDescriptor>,
    chapter_order: &[ChapterId],
    config: &SchedulerConfig,
) -> HashMap<PageId, Lane> {
    let mut desired = HashMap::new();
    let index = cursor.page_index as i64;
    let window_ahead = config.window_ahead as i64;
    let window_behind = config.window_behind as i64;
    let lead = config.chapter_preload_lead_pages as i64;

    let cursor_page = PageId { chapter_id: cursor.chapter_id.clone(), page_index: cursor.page_index };
    if tasks.contains_key(&cursor_page) {
        desired.insert(cursor_page.clone(), Lane::VisibleOrCursor);
    }

    let fg_lo = index - window_behind;
    let fg_hi = index + window_ahead - 1;
    insert_range(&mut desired, tasks, &cursor.chapter_id, fg_lo, fg_hi, Lane::ForegroundWindow, &cursor_page);

    let prefetch_lo = index + window_ahead;
    let prefetch_hi = index + window_ahead + lead - 1;
    insert_range(&mut desired, tasks, &cursor.chapter_id, prefetch_lo, prefetch_hi, Lane::InChapterPrefetch, &cursor_page);

    let pages_remaining = match max_index_in_chapter(tasks, &cursor.chapter_id) {
        Some(max_index) => (max_index as i64 - index).max(0),
        None => 0,
    };

    if pages_remaining < lead {
        if let Some(next_chapter_id) = next_chapter(chapter_order, &cursor.chapter_id) {
            for offset in 0..window_ahead {
                let page_id = PageId { chapter_id: next_chapter_id.clone(), page_index: offset as u32 };
                if tasks.contains_key(&page_id) {
                    desired.insert(page_id, Lane::NextChapterPrefetch);
                }
            }
        }
    }

    desired
}

fn insert_range(
    desired: &mut HashMap<PageId, Lane>,
    tasks: &HashMap<PageId, PageDescriptor>,
    chapter_id: &ChapterId,
    lo: i64,
    hi: i64,
    lane: Lane,
    exclude: &PageId,
) {
    if hi < lo {
        return;
    }
    let lo = lo.max(0) as u32;
    let hi = hi.max(0) as u32;
    for page_index in lo..=hi {
        let page_id = PageId { chapter_id: chapter_id.clone(), page_index };
        if &page_id == exclude {
            continue;
        }
        if tasks.contains_key(&page_id) {
            desired.insert(page_id, lane);
        }
    }
}

fn next_chapter(chapter_order: &[ChapterId], current: &ChapterId) -> Option<ChapterId> {
    let position = chapter_order.iter().position(|id| id == current)?;
    chapter_order.get(position + 1).cloned()
}

/// Sign of the most recent cursor move, used to bias same-lane prefetch
/// ordering toward the direction the reader is actually scrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    /// Cursor is advancing (or has not moved yet)
    #[default]
    Forward,
    /// Cursor is moving back toward earlier pages
    Backward,
}

/// Whether `page_id` falls within the cursor's foreground window — the
/// cursor page itself or `ForegroundWindow` (spec §4.1.8's
/// `cursor_to_first_ready_ms` is scoped to exactly this range).
pub fn in_foreground_window(page_id: &PageId, cursor: &Cursor, config: &SchedulerConfig) -> bool {
    if page_id.chapter_id != cursor.chapter_id {
        return false;
    }
    let index = cursor.page_index as i64;
    let fg_lo = index - config.window_behind as i64;
    let fg_hi = index + config.window_ahead as i64 - 1;
    (fg_lo..=fg_hi).contains(&(page_id.page_index as i64))
}

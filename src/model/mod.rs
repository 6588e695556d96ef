//! Domain model: chapter/page descriptors and the derived flat projection.

pub mod chapter;
pub mod projection;

pub use chapter::{ChapterDescriptor, LoadedChapter, PageDescriptor};
pub use projection::{build_projection, find_flat_index, FlatPage, ProjectionItem, TransitionMarker};

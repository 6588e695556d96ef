//! Reading-window store (spec §4.3)

pub mod store;

pub use store::{ReadingWindowStore, WindowSnapshot, WorkMeta};

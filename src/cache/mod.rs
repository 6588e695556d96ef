//! Content-addressed, per-chapter evictable image cache (spec §4.2).

pub mod default_collaborators;
pub mod naming;
pub mod store;

pub use default_collaborators::{ImageSizeDecoder, ReqwestHttpClient, StdFileSystem};
pub use store::{CachedArtifact, ImageCache};

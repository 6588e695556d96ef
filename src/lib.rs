//! A reading-session engine for paginated webtoon/manga content: schedules
//! page downloads around a reading cursor, caches decoded artifacts on
//! disk, and maintains the flat, transition-aware projection a renderer
//! walks over.
#![warn(missing_docs)]

/// Core foundations: errors, configuration, domain identifiers
pub mod core;
/// Domain model: chapter/page descriptors, the flat projection
pub mod model;
/// External collaborator traits the engine is driven through
pub mod collaborators;
/// Content-addressed, per-chapter evictable image cache
pub mod cache;
/// Page download scheduler
pub mod scheduler;
/// Reading-window store
pub mod window;
/// Chapter flow resolver
pub mod flow;
/// Debounced progress/history/timeline sync
pub mod progress;
/// Lightweight runtime observability
pub mod system;

pub use core::{Config, Error, Result};

/// Crate version, as reported by Cargo
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name, as reported by Cargo
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install the default `tracing` subscriber, the way every binary embedding
/// this engine is expected to before constructing a session.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    tracing::info!("initializing {} v{}", NAME, VERSION);
}

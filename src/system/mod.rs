//! Runtime observability for the engine: lightweight counters, nothing else.

pub mod metrics;

pub use metrics::{EngineMetrics, MetricsSnapshot};

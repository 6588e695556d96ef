//! Page download scheduler (spec §4.1)

pub mod desired_set;
pub mod engine;
pub mod lanes;
pub mod retry;
pub mod state;

pub use desired_set::Cursor;
pub use engine::{LaneStats, PageScheduler, SchedulerSnapshot, SubscriptionId};
pub use lanes::Lane;
pub use state::{CancelReason, PageRuntimeState};

//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod compaction;
mod limiter;
mod stats;

pub use backend::Admission;
pub use bucket::{RefillPolicy, TokenBucket};
pub use compaction::spawn_compaction;
pub use limiter::{LimiterOptions, RateLimiter, MAX_LEVEL_LIMIT};
pub use stats::{LimiterStats, StatsSnapshot};

//! Decision counters kept alongside a limiter.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running totals of admission outcomes and evictions.
#[derive(Debug, Default)]
pub struct LimiterStats {
    admitted: AtomicU64,
    denied: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time copy of [`LimiterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub denied: u64,
    pub evicted: u64,
}

impl LimiterStats {
    pub fn record_decision(&self, admitted: bool) {
        let counter = if admitted { &self.admitted } else { &self.denied };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

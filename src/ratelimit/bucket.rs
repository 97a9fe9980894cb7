//! Per-identifier token bucket.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How a bucket regains tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefillPolicy {
    /// Fixed allotment for the bucket's lifetime. Tokens come back only when
    /// the bucket is evicted and recreated, or on an explicit [`TokenBucket::refill`].
    #[default]
    Never,
    /// Restore full capacity on the first use attempt after the window elapses.
    Interval(Duration),
}

/// A token bucket that tracks remaining tokens and last activity.
///
/// All state sits behind one lock so that concurrent use attempts never
/// observe or consume the same token.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    policy: RefillPolicy,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_used: Instant,
    window_start: Instant,
}

impl TokenBucket {
    /// Create a full bucket holding `capacity` tokens.
    pub fn new(capacity: u64, policy: RefillPolicy) -> Self {
        Self::new_at(capacity, policy, Instant::now())
    }

    pub fn new_at(capacity: u64, policy: RefillPolicy, now: Instant) -> Self {
        Self {
            capacity,
            policy,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_used: now,
                window_start: now,
            }),
        }
    }

    /// Attempt to take one token.
    ///
    /// Every attempt counts as activity, admitted or not.
    pub fn use_token(&self) -> bool {
        self.use_token_at(Instant::now())
    }

    pub fn use_token_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        if let RefillPolicy::Interval(window) = self.policy {
            if now.saturating_duration_since(state.window_start) >= window {
                state.tokens = self.capacity;
                state.window_start = now;
            }
        }

        state.last_used = now;
        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Whether the bucket has been idle for longer than `threshold`.
    pub fn is_old(&self, now: Instant, threshold: Duration) -> bool {
        let state = self.state.lock();
        now.saturating_duration_since(state.last_used) > threshold
    }

    /// Restore full capacity.
    pub fn refill(&self) {
        let mut state = self.state.lock();
        state.tokens = self.capacity;
    }

    pub fn remaining(&self) -> u64 {
        self.state.lock().tokens
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn last_used(&self) -> Instant {
        self.state.lock().last_used
    }
}

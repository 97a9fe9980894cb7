//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use super::backend::Admission;
use super::bucket::{RefillPolicy, TokenBucket};
use super::stats::{LimiterStats, StatsSnapshot};
use crate::config::RateLimitingConfig;
use crate::error::{Result, TollgateError};
use crate::skiplist::{InsertError, SkipList, DEFAULT_MAX_LEVEL};

/// Default number of tokens handed to a fresh bucket.
const DEFAULT_RATE: u64 = 10;
/// Default idle period after which a bucket may be evicted.
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);
/// Largest tower height accepted for the backing store.
pub const MAX_LEVEL_LIMIT: usize = 64;

/// Construction parameters for a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct LimiterOptions {
    /// Tokens per bucket
    pub rate: u64,
    /// Idle period after which compaction evicts a bucket
    pub stale_after: Duration,
    /// How buckets regain tokens
    pub refill: RefillPolicy,
    /// Tower height cap of the backing skip list
    pub max_level: usize,
    /// Seed for the skip list's level generator; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            stale_after: DEFAULT_STALE_AFTER,
            refill: RefillPolicy::Never,
            max_level: DEFAULT_MAX_LEVEL,
            seed: None,
        }
    }
}

impl From<&RateLimitingConfig> for LimiterOptions {
    fn from(config: &RateLimitingConfig) -> Self {
        Self {
            rate: config.rate,
            stale_after: Duration::from_secs(config.stale_after_secs),
            refill: config
                .refill_interval_secs
                .map(|secs| RefillPolicy::Interval(Duration::from_secs(secs)))
                .unwrap_or_default(),
            max_level: config.max_level,
            seed: None,
        }
    }
}

/// Per-identifier admission controller.
///
/// Each identifier gets its own [`TokenBucket`], created lazily on first use
/// and kept in an ordered store until compaction finds it idle. The store is
/// guarded by a single lock; bucket state has its own lock, only ever taken
/// while holding the store lock or with no lock held.
pub struct RateLimiter {
    rate: u64,
    stale_after: Duration,
    refill: RefillPolicy,
    buckets: Mutex<SkipList<String, Arc<TokenBucket>>>,
    stats: LimiterStats,
}

impl RateLimiter {
    /// Create a limiter handing `rate` tokens to every identifier.
    pub fn new(rate: u64) -> Result<Self> {
        Self::with_options(LimiterOptions {
            rate,
            ..LimiterOptions::default()
        })
    }

    pub fn with_options(options: LimiterOptions) -> Result<Self> {
        if options.rate == 0 {
            return Err(TollgateError::InvalidRate(options.rate));
        }
        if options.max_level == 0 || options.max_level > MAX_LEVEL_LIMIT {
            return Err(TollgateError::Config(format!(
                "max_level must be between 1 and {}, got {}",
                MAX_LEVEL_LIMIT, options.max_level
            )));
        }

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!(
            rate = options.rate,
            stale_after = ?options.stale_after,
            refill = ?options.refill,
            "Creating rate limiter"
        );

        Ok(Self {
            rate: options.rate,
            stale_after: options.stale_after,
            refill: options.refill,
            buckets: Mutex::new(SkipList::with_rng(options.max_level, rng)),
            stats: LimiterStats::default(),
        })
    }

    /// Decide whether a request from `identifier` may proceed.
    pub fn should_serve(&self, identifier: &str) -> bool {
        self.should_serve_at(identifier, Instant::now())
    }

    /// [`should_serve`](Self::should_serve) with an explicit clock reading.
    ///
    /// Internal store errors deny the request.
    pub fn should_serve_at(&self, identifier: &str, now: Instant) -> bool {
        let bucket = match self.fetch_bucket(identifier, now) {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Failed to fetch bucket, denying request");
                self.stats.record_decision(false);
                return false;
            }
        };

        let admitted = bucket.use_token_at(now);
        self.stats.record_decision(admitted);

        if admitted {
            trace!(identifier = %identifier, remaining = bucket.remaining(), "Request admitted");
        } else {
            debug!(identifier = %identifier, "Rate limit exceeded");
        }
        admitted
    }

    /// Look up the bucket for `identifier`, creating a full one if absent.
    fn fetch_bucket(
        &self,
        identifier: &str,
        now: Instant,
    ) -> std::result::Result<Arc<TokenBucket>, InsertError> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.search(identifier) {
            return Ok(Arc::clone(bucket));
        }

        let bucket = Arc::new(TokenBucket::new_at(self.rate, self.refill, now));
        buckets.insert(identifier.to_owned(), Arc::clone(&bucket))?;
        debug!(
            identifier = %identifier,
            rate = self.rate,
            tracked = buckets.len(),
            "Creating new bucket"
        );
        Ok(bucket)
    }

    /// Evict every bucket idle for longer than the staleness threshold.
    ///
    /// Returns the number of evicted identifiers.
    pub fn compact(&self) -> usize {
        self.compact_at(Instant::now())
    }

    /// [`compact`](Self::compact) with an explicit clock reading.
    ///
    /// Victims are collected in one pass and removed in a second. A victim
    /// that saw activity between the two passes is kept.
    pub fn compact_at(&self, now: Instant) -> usize {
        let victims: Vec<String> = {
            let buckets = self.buckets.lock();
            buckets
                .iter()
                .filter(|(_, bucket)| bucket.is_old(now, self.stale_after))
                .map(|(identifier, _)| identifier.clone())
                .collect()
        };

        if victims.is_empty() {
            debug!("Compaction found no idle buckets");
            return 0;
        }

        let mut buckets = self.buckets.lock();
        let mut evicted = 0;
        for identifier in &victims {
            let still_old = buckets
                .search(identifier.as_str())
                .is_some_and(|bucket| bucket.is_old(now, self.stale_after));
            if still_old && buckets.remove(identifier.as_str()).is_some() {
                evicted += 1;
            }
        }
        self.stats.record_evictions(evicted);

        info!(evicted, tracked = buckets.len(), "Compaction finished");
        evicted
    }

    /// Restore full capacity for `identifier`. Returns `false` if it is not tracked.
    pub fn reset(&self, identifier: &str) -> bool {
        let buckets = self.buckets.lock();
        match buckets.search(identifier) {
            Some(bucket) => {
                bucket.refill();
                true
            }
            None => false,
        }
    }

    /// Tokens left for `identifier`, or `None` if it is not tracked.
    pub fn remaining(&self, identifier: &str) -> Option<u64> {
        self.buckets
            .lock()
            .search(identifier)
            .map(|bucket| bucket.remaining())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.buckets.lock().contains_key(identifier)
    }

    /// Tracked identifiers in ascending order.
    pub fn identifiers(&self) -> Vec<String> {
        self.buckets
            .lock()
            .iter()
            .map(|(identifier, _)| identifier.clone())
            .collect()
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Drop every bucket.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Admission for RateLimiter {
    fn should_serve(&self, identifier: &str) -> bool {
        RateLimiter::should_serve(self, identifier)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("stale_after", &self.stale_after)
            .field("refill", &self.refill)
            .field("tracked", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rate: u64) -> RateLimiter {
        RateLimiter::with_options(LimiterOptions {
            rate,
            stale_after: Duration::from_secs(60),
            seed: Some(42),
            ..LimiterOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            RateLimiter::new(0),
            Err(TollgateError::InvalidRate(0))
        ));
    }

    #[test]
    fn test_bad_max_level_rejected() {
        let result = RateLimiter::with_options(LimiterOptions {
            max_level: 0,
            ..LimiterOptions::default()
        });
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(5).unwrap();
        assert_eq!(limiter.rate(), 5);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_rate_admits_then_denies() {
        let limiter = limiter(3);

        assert!(limiter.should_serve("A"));
        assert!(limiter.should_serve("A"));
        assert!(limiter.should_serve("A"));
        assert!(!limiter.should_serve("A"));

        // Other identifiers are unaffected
        assert!(limiter.should_serve("B"));
    }

    #[test]
    fn test_bucket_created_lazily() {
        let limiter = limiter(3);
        assert!(!limiter.contains("10.0.0.1"));
        assert_eq!(limiter.remaining("10.0.0.1"), None);

        limiter.should_serve("10.0.0.1");
        limiter.should_serve("10.0.0.1");

        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.remaining("10.0.0.1"), Some(1));
    }

    #[test]
    fn test_compaction_restores_capacity() {
        let limiter = limiter(3);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.should_serve_at("A", start);
        }
        assert!(!limiter.should_serve_at("A", start));

        let later = start + Duration::from_secs(61);
        assert_eq!(limiter.compact_at(later), 1);
        assert!(!limiter.contains("A"));
        assert!(limiter.should_serve_at("A", later));
        assert_eq!(limiter.remaining("A"), Some(2));
    }

    #[test]
    fn test_compaction_keeps_active_buckets() {
        let limiter = limiter(3);
        let start = Instant::now();
        limiter.should_serve_at("idle", start);
        limiter.should_serve_at("busy", start);
        limiter.should_serve_at("busy", start + Duration::from_secs(50));

        assert_eq!(limiter.compact_at(start + Duration::from_secs(70)), 1);
        assert_eq!(limiter.identifiers(), vec!["busy".to_string()]);
    }

    #[test]
    fn test_compaction_twice_is_safe() {
        let limiter = limiter(3);
        let start = Instant::now();
        for id in ["c", "a", "b"] {
            limiter.should_serve_at(id, start);
        }

        let later = start + Duration::from_secs(120);
        assert_eq!(limiter.compact_at(later), 3);
        assert_eq!(limiter.compact_at(later), 0);
        assert!(limiter.is_empty());
        assert_eq!(limiter.stats().evicted, 3);
    }

    #[test]
    fn test_identifiers_sorted() {
        let limiter = limiter(1);
        for id in ["192.168.0.9", "10.0.0.1", "172.16.4.4", "10.0.0.0"] {
            limiter.should_serve(id);
        }
        assert_eq!(
            limiter.identifiers(),
            vec!["10.0.0.0", "10.0.0.1", "172.16.4.4", "192.168.0.9"]
        );
    }

    #[test]
    fn test_reset_refills_bucket() {
        let limiter = limiter(1);
        assert!(!limiter.reset("A"));

        assert!(limiter.should_serve("A"));
        assert!(!limiter.should_serve("A"));
        assert!(limiter.reset("A"));
        assert!(limiter.should_serve("A"));
    }

    #[test]
    fn test_stats_track_decisions() {
        let limiter = limiter(2);
        for _ in 0..5 {
            limiter.should_serve("A");
        }
        let stats = limiter.stats();
        assert_eq!(stats.admitted, 2);
        assert_eq!(stats.denied, 3);
    }

    #[test]
    fn test_interval_refill_from_options() {
        let limiter = RateLimiter::with_options(LimiterOptions {
            rate: 1,
            refill: RefillPolicy::Interval(Duration::from_secs(1)),
            seed: Some(1),
            ..LimiterOptions::default()
        })
        .unwrap();
        let start = Instant::now();

        assert!(limiter.should_serve_at("A", start));
        assert!(!limiter.should_serve_at("A", start));
        assert!(limiter.should_serve_at("A", start + Duration::from_secs(1)));
    }

    #[test]
    fn test_options_from_config() {
        let config = RateLimitingConfig {
            rate: 7,
            stale_after_secs: 30,
            refill_interval_secs: Some(5),
            ..RateLimitingConfig::default()
        };
        let options = LimiterOptions::from(&config);

        assert_eq!(options.rate, 7);
        assert_eq!(options.stale_after, Duration::from_secs(30));
        assert_eq!(options.refill, RefillPolicy::Interval(Duration::from_secs(5)));
    }

    #[test]
    fn test_concurrent_same_identifier() {
        let limiter = Arc::new(limiter(25));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..10).filter(|_| limiter.should_serve("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_concurrent_many_identifiers() {
        let limiter = Arc::new(limiter(2));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        limiter.should_serve(&format!("client-{}", (t * 100 + i) % 300));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids = limiter.identifiers();
        assert_eq!(ids.len(), 300);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_compaction_racing_requests() {
        let limiter = Arc::new(RateLimiter::with_options(LimiterOptions {
            rate: 1_000_000,
            stale_after: Duration::ZERO,
            seed: Some(9),
            ..LimiterOptions::default()
        })
        .unwrap());

        let writer = {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    assert!(limiter.should_serve(&format!("id-{}", i % 50)));
                }
            })
        };
        for _ in 0..50 {
            limiter.compact();
        }
        writer.join().unwrap();

        let ids = limiter.identifiers();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids.len() <= 50);
    }
}

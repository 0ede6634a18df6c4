use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

/// A single key's token bucket. Refill and admission both happen through a
/// compare-and-swap loop on a packed `(tokens_milli, last_refill_millis)`
/// pair so the hot admission path never takes a per-key lock.
struct Bucket {
    /// Tokens available, scaled by 1000 so fractional refill survives
    /// integer CAS without losing precision across many small ticks.
    tokens_milli: AtomicU64,
    last_refill: AtomicU64,
    created_at: Instant,
    rps: f64,
    burst: f64,
}

impl Bucket {
    fn new(now: Instant, rps: f64, burst: f64) -> Self {
        Self {
            tokens_milli: AtomicU64::new((burst * 1000.0) as u64),
            last_refill: AtomicU64::new(0),
            created_at: now,
            rps,
            burst,
        }
    }

    fn millis_since_creation(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.created_at).as_millis() as u64
    }

    /// Attempts to admit one request. Returns `true` if a token was consumed.
    fn try_admit(&self, now: Instant) -> bool {
        let now_ms = self.millis_since_creation(now);
        loop {
            let last = self.last_refill.load(Ordering::Acquire);
            let current = self.tokens_milli.load(Ordering::Acquire);

            let elapsed_ms = now_ms.saturating_sub(last);
            let refill_milli = (elapsed_ms as f64 * self.rps) as u64;
            let capacity_milli = (self.burst * 1000.0) as u64;
            let refilled = (current + refill_milli).min(capacity_milli);

            if refilled < 1000 {
                // Not enough for a whole token; persist the refill progress
                // so it isn't lost, then deny.
                if self.tokens_milli.compare_exchange(
                    current,
                    refilled,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) == Ok(current)
                {
                    self.last_refill.store(now_ms, Ordering::Release);
                }
                return false;
            }

            let after = refilled - 1000;
            if self
                .tokens_milli
                .compare_exchange(current, after, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.last_refill.store(now_ms, Ordering::Release);
                return true;
            }
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last_ms = self.last_refill.load(Ordering::Acquire);
        let now_ms = self.millis_since_creation(now);
        Duration::from_millis(now_ms.saturating_sub(last_ms))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub default_rps: f64,
    pub burst_multiplier: f64,
    pub idle_evict: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_rps: 5.0,
            burst_multiplier: 2.0,
            idle_evict: Duration::from_secs(5 * 60),
        }
    }
}

/// Per-key token-bucket admission control. The bucket map itself is
/// published through an `ArcSwap`, the same reader-biased pattern
/// `Resolver`/`AuthCache` use: a hot lookup is a single atomic load and
/// never blocks behind a writer. Only publishing a brand-new key's bucket
/// pays a copy-on-write republish of the map; every admission after that
/// goes straight through the per-bucket CAS loop with no lock at all.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: ArcSwap<HashMap<String, Arc<Bucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Admits a request for `key`, creating its bucket on first sight.
    /// `rps_override` lets a per-key rate limit (e.g. from an `LLMKey`
    /// record) replace the configured default.
    pub fn admit(&self, key: &str, rps_override: Option<f64>) -> bool {
        let now = Instant::now();
        let bucket = match self.buckets.load().get(key) {
            Some(bucket) => bucket.clone(),
            None => self.insert_bucket(key, now, rps_override),
        };
        bucket.try_admit(now)
    }

    /// Publishes a new bucket for `key`. Two concurrent first-requests for
    /// the same unseen key may each publish their own bucket, with the
    /// loser's token deduction lost; this is the same accepted race the
    /// resolver and auth caches take on cold misses and is bounded by
    /// concurrent distinct misses, not a correctness issue.
    fn insert_bucket(&self, key: &str, now: Instant, rps_override: Option<f64>) -> Arc<Bucket> {
        let rps = rps_override.unwrap_or(self.config.default_rps);
        let burst = rps * self.config.burst_multiplier;
        let bucket = Arc::new(Bucket::new(now, rps, burst));
        let mut next = (**self.buckets.load()).clone();
        next.insert(key.to_string(), bucket.clone());
        self.buckets.store(Arc::new(next));
        bucket
    }

    /// Evicts buckets idle for longer than `idle_evict`. Intended to be
    /// driven by a periodic sweeper task.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let current = self.buckets.load();
        let mut next = (**current).clone();
        let before = next.len();
        next.retain(|_, bucket| bucket.idle_for(now) <= self.config.idle_evict);
        let evicted = before - next.len();
        if evicted > 0 {
            self.buckets.store(Arc::new(next));
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.buckets.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

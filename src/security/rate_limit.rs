//! Token bucket admission control.
//!
//! One bucket per route, or per route and client when the route's limit is
//! `per_client`. Refill and consume happen under the bucket's map entry, so
//! concurrent requests on the same key never double-spend a token.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::routing::{Route, RoutingTable};

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_per_sec: f64,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity as f64,
            last_refill: now,
            capacity: config.capacity as f64,
            refill_per_sec: config.refill_per_sec,
        }
    }

    /// Pick up new limits after a reload without handing out a fresh burst.
    fn reconfigure(&mut self, config: &RateLimitConfig) {
        let capacity = config.capacity as f64;
        if self.capacity != capacity || self.refill_per_sec != config.refill_per_sec {
            self.capacity = capacity;
            self.refill_per_sec = config.refill_per_sec;
            self.tokens = self.tokens.min(capacity);
        }
    }

    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - self.tokens) / self.refill_per_sec;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub route: String,
    pub client: Option<String>,
}

/// Request refused by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds for the `Retry-After` header, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs_f64().ceil();
        if secs.is_finite() && secs < u64::MAX as f64 {
            (secs as u64).max(1)
        } else {
            u64::MAX
        }
    }
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<BucketKey, TokenBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, route: &Route, client: Option<&str>) -> Result<(), RateLimited> {
        self.check_at(route, client, Instant::now())
    }

    /// Admit one request on `route` for `client`.
    pub fn check_at(&self, route: &Route, client: Option<&str>, now: Instant) -> Result<(), RateLimited> {
        let config = &route.rate_limit;
        if !config.enabled {
            return Ok(());
        }

        let key = BucketKey {
            route: route.id.clone(),
            client: if config.per_client {
                client.map(str::to_string)
            } else {
                None
            },
        };

        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(config, now));
        bucket.reconfigure(config);

        bucket.try_acquire(now).map_err(|retry_after| {
            tracing::debug!(route = %route.id, client, ?retry_after, "Rate limit exceeded");
            metrics::record_rate_limited(&route.id);
            RateLimited { retry_after }
        })
    }

    /// Drop per-client buckets untouched for longer than their route allows.
    /// Returns the number of evicted buckets.
    pub fn evict_idle(&self, table: &RoutingTable, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|key, bucket| {
            if key.client.is_none() {
                return true;
            }
            let idle_limit = table
                .get(&key.route)
                .map(|r| Duration::from_secs(r.rate_limit.client_idle_secs))
                .unwrap_or(Duration::ZERO);
            now.saturating_duration_since(bucket.last_refill) < idle_limit
        });
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle client buckets");
        }
        evicted
    }

    /// Forget buckets of routes that no longer exist or stopped limiting.
    pub fn reconcile(&self, table: &RoutingTable) {
        self.buckets.retain(|key, _| match table.get(&key.route) {
            Some(route) => {
                route.rate_limit.enabled && (route.rate_limit.per_client || key.client.is_none())
            }
            None => false,
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

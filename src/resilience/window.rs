//! Time-boxed sliding window of call outcomes.
//!
//! The window is split into a fixed number of buckets. A bucket is reused
//! once its epoch falls out of the window, so old outcomes age out in
//! `width / BUCKETS` steps.

use std::time::{Duration, Instant};

pub const BUCKETS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    epoch: u64,
    successes: u32,
    failures: u32,
}

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    buckets: [Bucket; BUCKETS],
    bucket_width: Duration,
    origin: Instant,
}

/// Aggregated counts over the live part of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub total: u32,
    pub failures: u32,
}

impl WindowTotals {
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failures as f64 / self.total as f64
        }
    }
}

impl SlidingWindow {
    pub fn new(width: Duration, origin: Instant) -> Self {
        let bucket_width = (width / BUCKETS as u32).max(Duration::from_millis(1));
        Self {
            buckets: [Bucket::default(); BUCKETS],
            bucket_width,
            origin,
        }
    }

    fn epoch(&self, now: Instant) -> u64 {
        (now.saturating_duration_since(self.origin).as_nanos() / self.bucket_width.as_nanos()) as u64
    }

    pub fn record(&mut self, now: Instant, failure: bool) {
        let epoch = self.epoch(now);
        let bucket = &mut self.buckets[(epoch % BUCKETS as u64) as usize];
        if bucket.epoch != epoch {
            *bucket = Bucket {
                epoch,
                ..Bucket::default()
            };
        }
        if failure {
            bucket.failures = bucket.failures.saturating_add(1);
        } else {
            bucket.successes = bucket.successes.saturating_add(1);
        }
    }

    pub fn totals(&self, now: Instant) -> WindowTotals {
        let current = self.epoch(now);
        self.buckets
            .iter()
            .filter(|b| b.epoch <= current && current - b.epoch < BUCKETS as u64)
            .fold(WindowTotals::default(), |acc, b| WindowTotals {
                total: acc.total + b.successes + b.failures,
                failures: acc.failures + b.failures,
            })
    }

    pub fn reset(&mut self, now: Instant) {
        self.buckets = [Bucket::default(); BUCKETS];
        self.origin = now;
    }
}

//! Statistics tracking for the resolver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic per-outcome counters, reset on every snapshot.
pub struct Stats {
    started: Instant,
    requests: AtomicU64,
    answered: AtomicU64,
    nxdomain: AtomicU64,
    blocked: AtomicU64,
    server_errors: AtomicU64,
    failed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            answered: AtomicU64::new(0),
            nxdomain: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    fn record_replied(&self, counter: &AtomicU64, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn record_answered(&self, response_time_ms: f64) {
        self.record_replied(&self.answered, response_time_ms);
    }

    pub fn record_nxdomain(&self, response_time_ms: f64) {
        self.record_replied(&self.nxdomain, response_time_ms);
    }

    pub fn record_blocked(&self, response_time_ms: f64) {
        self.record_replied(&self.blocked, response_time_ms);
    }

    /// Requests held and dropped after an upstream error. They are not
    /// counted towards the average response time.
    pub fn record_server_error(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests dropped without a reply.
    pub fn record_failed(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let answered = self.answered.swap(0, Ordering::Relaxed);
        let nxdomain = self.nxdomain.swap(0, Ordering::Relaxed);
        let blocked = self.blocked.swap(0, Ordering::Relaxed);
        let server_errors = self.server_errors.swap(0, Ordering::Relaxed);
        let failed = self.failed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let replied = answered + nxdomain + blocked;
        let avg_response_ms = if replied > 0 {
            (total_us as f64 / replied as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            answered,
            nxdomain,
            blocked,
            server_errors,
            failed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub answered: u64,
    pub nxdomain: u64,
    pub blocked: u64,
    pub server_errors: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}

//! Authority metrics
//!
//! Plain atomics, shared by every shard through an `Arc`. Nothing here is
//! authority state: counters may be read from any task at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries for handoff negotiation (in milliseconds)
const HANDOFF_BUCKETS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn with_buckets(boundaries: &[f64]) -> Self {
        Self {
            buckets: (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored as microseconds for precision
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative `(upper bound, count)` pairs, ending with `+Inf`
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturating: a reset may race with a decrement from another shard
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn sub(&self, n: u64) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(n))
            });
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters for every decision the authority makes
#[derive(Debug)]
pub struct AuthorityMetrics {
    pub lock_requests: Counter,
    pub grants: Counter,
    pub denials: Counter,
    pub queued: Counter,
    pub unlocks: Counter,
    pub rejected_unlocks: Counter,
    pub handoffs: Counter,
    pub waiters_dropped: Counter,
    pub client_down: Counter,
    pub resets: Counter,

    pub held_keys: Gauge,

    /// Time spent negotiating a vacated key, milliseconds
    pub handoff_latency: Histogram,
}

impl AuthorityMetrics {
    pub fn new() -> Self {
        Self {
            lock_requests: Counter::default(),
            grants: Counter::default(),
            denials: Counter::default(),
            queued: Counter::default(),
            unlocks: Counter::default(),
            rejected_unlocks: Counter::default(),
            handoffs: Counter::default(),
            waiters_dropped: Counter::default(),
            client_down: Counter::default(),
            resets: Counter::default(),
            held_keys: Gauge::default(),
            handoff_latency: Histogram::with_buckets(&HANDOFF_BUCKETS),
        }
    }

    pub fn record_handoff(&self, elapsed: Duration) {
        self.handoff_latency.observe(elapsed.as_secs_f64() * 1000.0);
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let counters = [
            ("keylock_lock_requests_total", "Lock requests received", &self.lock_requests),
            ("keylock_grants_total", "Keys granted, directly or by handoff", &self.grants),
            ("keylock_denials_total", "Non-blocking lock requests denied", &self.denials),
            ("keylock_queued_total", "Lock requests queued behind a holder", &self.queued),
            ("keylock_unlocks_total", "Successful unlocks", &self.unlocks),
            ("keylock_rejected_unlocks_total", "Unlocks answered not_yours or not_locked", &self.rejected_unlocks),
            ("keylock_handoffs_total", "Keys handed to a waiting client", &self.handoffs),
            ("keylock_waiters_dropped_total", "Waiters skipped during handoff", &self.waiters_dropped),
            ("keylock_client_down_total", "Client termination notices", &self.client_down),
            ("keylock_resets_total", "State resets", &self.resets),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP keylock_held_keys Keys currently held\n");
        out.push_str("# TYPE keylock_held_keys gauge\n");
        let _ = writeln!(out, "keylock_held_keys {}", self.held_keys.get());

        out.push_str("# HELP keylock_handoff_duration_ms Handoff negotiation time\n");
        out.push_str("# TYPE keylock_handoff_duration_ms histogram\n");
        for (le, count) in self.handoff_latency.get_buckets() {
            let le = if le.is_infinite() {
                "+Inf".to_string()
            } else {
                le.to_string()
            };
            let _ = writeln!(
                out,
                "keylock_handoff_duration_ms_bucket{{le=\"{}\"}} {}",
                le, count
            );
        }
        let _ = writeln!(
            out,
            "keylock_handoff_duration_ms_sum {}",
            self.handoff_latency.sum()
        );
        let _ = writeln!(
            out,
            "keylock_handoff_duration_ms_count {}",
            self.handoff_latency.count()
        );

        out
    }
}

impl Default for AuthorityMetrics {
    fn default() -> Self {
        Self::new()
    }
}

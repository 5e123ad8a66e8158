//! Metrics collection for the access engine.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for engine operations. Shared by reference; every method is lock-free or
/// touches a single DashMap shard.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Number of permission checks performed.
    pub permission_checks: AtomicU64,
    /// Checks that ended in an allow.
    pub grants: AtomicU64,
    /// Checks that ended in a deny.
    pub denials: AtomicU64,
    /// Effective-set cache hits.
    pub cache_hits: AtomicU64,
    /// Effective-set cache misses.
    pub cache_misses: AtomicU64,
    /// Decision cache hits.
    pub decision_cache_hits: AtomicU64,
    /// Effective permission computations actually executed.
    pub computations: AtomicU64,
    /// Callers that joined an in-flight computation instead of starting one.
    pub coalesced_waits: AtomicU64,
    /// Store or internal faults.
    pub store_errors: AtomicU64,
    /// Cache invalidations.
    pub invalidations: AtomicU64,
    /// Cumulative evaluation time in microseconds.
    pub total_evaluation_micros: AtomicU64,
    /// Denial counts by reason code.
    pub denials_by_reason: DashMap<String, AtomicU64>,
    /// Error counts by kind.
    pub error_counts: DashMap<String, AtomicU64>,
}

impl EngineMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed permission check.
    pub fn record_decision(&self, allowed: bool, reason_code: Option<&str>, elapsed: Duration) {
        self.permission_checks.fetch_add(1, Ordering::Relaxed);
        self.total_evaluation_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if allowed {
            self.grants.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.denials.fetch_add(1, Ordering::Relaxed);
        if let Some(code) = reason_code {
            increment(&self.denials_by_reason, code);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_cache_hit(&self) {
        self.decision_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_computation(&self) {
        self.computations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced_wait(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error.
    pub fn record_error(&self, error_kind: &str) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        increment(&self.error_counts, error_kind);
    }

    /// Number of effective permission computations executed so far.
    pub fn computation_count(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    /// Get cache hit ratio.
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get metrics summary.
    pub fn summary(&self) -> MetricsSummary {
        let checks = self.permission_checks.load(Ordering::Relaxed);
        let total_micros = self.total_evaluation_micros.load(Ordering::Relaxed);
        MetricsSummary {
            permission_checks: checks,
            grants: self.grants.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_hit_ratio: self.cache_hit_ratio(),
            decision_cache_hits: self.decision_cache_hits.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            avg_evaluation_micros: if checks == 0 {
                0.0
            } else {
                total_micros as f64 / checks as f64
            },
            denials_by_reason: snapshot(&self.denials_by_reason),
            error_counts: snapshot(&self.error_counts),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        for counter in [
            &self.permission_checks,
            &self.grants,
            &self.denials,
            &self.cache_hits,
            &self.cache_misses,
            &self.decision_cache_hits,
            &self.computations,
            &self.coalesced_waits,
            &self.store_errors,
            &self.invalidations,
            &self.total_evaluation_micros,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.denials_by_reason.clear();
        self.error_counts.clear();
    }
}

fn increment(map: &DashMap<String, AtomicU64>, key: &str) {
    map.entry(key.to_string())
        .and_modify(|count| {
            count.fetch_add(1, Ordering::Relaxed);
        })
        .or_insert_with(|| AtomicU64::new(1));
}

fn snapshot(map: &DashMap<String, AtomicU64>) -> HashMap<String, u64> {
    map.iter()
        .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
        .collect()
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub permission_checks: u64,
    pub grants: u64,
    pub denials: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub decision_cache_hits: u64,
    pub computations: u64,
    pub coalesced_waits: u64,
    pub store_errors: u64,
    pub invalidations: u64,
    pub avg_evaluation_micros: f64,
    pub denials_by_reason: HashMap<String, u64>,
    pub error_counts: HashMap<String, u64>,
}

//! Engine instrumentation.
//!
//! Lightweight atomics-based counters the engine increments on its hot
//! paths; cheap enough to be always-on.

use std::sync::atomic::{AtomicU64, Ordering};

/// A counter that can only increase.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters for the engine's externally observable activity.
#[derive(Debug, Default)]
pub struct MarketMetrics {
    pub items_created: Counter,
    pub positions_opened: Counter,
    pub trades_settled: Counter,
    /// Gross value settled, saturated at u64 for export purposes.
    pub value_settled: Counter,
    pub claims_accrued: Counter,
    /// Total claimable value currently outstanding, saturated at u64.
    pub claims_outstanding: Gauge,
    pub withdrawals: Counter,
    pub auctions_closed: Counter,
    pub raffles_closed: Counter,
    pub loans_closed: Counter,
}

impl MarketMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_settlement(&self, gross: u128) {
        self.trades_settled.inc();
        self.value_settled
            .inc_by(u64::try_from(gross).unwrap_or(u64::MAX));
    }

    pub fn record_claims_outstanding(&self, total: u128) {
        self.claims_outstanding
            .set(u64::try_from(total).unwrap_or(u64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments() {
        let c = Counter::new();
        c.inc();
        c.inc_by(4);
        assert_eq!(c.get(), 5);
    }

    #[test]
    fn settlement_saturates_wide_values() {
        let m = MarketMetrics::new();
        m.record_settlement(u128::MAX);
        assert_eq!(m.trades_settled.get(), 1);
        assert_eq!(m.value_settled.get(), u64::MAX);
    }

    #[test]
    fn gauge_moves_both_ways_and_floors_at_zero() {
        let g = Gauge::new();
        g.inc();
        g.inc();
        g.dec();
        assert_eq!(g.get(), 1);
        g.dec();
        g.dec();
        assert_eq!(g.get(), 0);
        g.set(7);
        assert_eq!(g.get(), 7);
    }

    #[test]
    fn outstanding_claims_track_and_saturate() {
        let m = MarketMetrics::new();
        m.record_claims_outstanding(40);
        assert_eq!(m.claims_outstanding.get(), 40);
        m.record_claims_outstanding(0);
        assert_eq!(m.claims_outstanding.get(), 0);
        m.record_claims_outstanding(u128::MAX);
        assert_eq!(m.claims_outstanding.get(), u64::MAX);
    }
}

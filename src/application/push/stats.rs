use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for one push job
#[derive(Debug, Default)]
pub struct PushStats {
    attempts: AtomicU64,
    pushed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`PushStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushStatsSnapshot {
    /// Pushes that won the guard and ran gather/send
    pub attempts: u64,
    pub pushed: u64,
    /// Gather or transport errors
    pub failed: u64,
    pub panicked: u64,
    /// Attempts turned away because another push was in flight
    pub skipped: u64,
}

impl PushStats {
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pushed(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PushStatsSnapshot {
        PushStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

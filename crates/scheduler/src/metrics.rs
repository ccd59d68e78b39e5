use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    removed: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

pub fn record_scheduled() {
    add(&COUNTERS.scheduled, 1);
}

pub fn record_started() {
    add(&COUNTERS.started, 1);
}

pub fn record_completed() {
    add(&COUNTERS.completed, 1);
}

pub fn record_failed() {
    add(&COUNTERS.failed, 1);
}

pub fn record_removed(count: usize) {
    add(&COUNTERS.removed, count as u64);
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub scheduled: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub removed: u64,
}

pub fn snapshot() -> SchedulerMetricsSnapshot {
    SchedulerMetricsSnapshot {
        scheduled: COUNTERS.scheduled.load(Ordering::Relaxed),
        started: COUNTERS.started.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        removed: COUNTERS.removed.load(Ordering::Relaxed),
    }
}

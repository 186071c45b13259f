use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn incr(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

const NUM_BUCKETS: usize = 32;

/// Histogram with power-of-two buckets: bucket `i` counts values in `[2^(i-1), 2^i)`, bucket 0
/// counts zeros, and the last bucket takes everything larger.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    count: AtomicU64,
    sum: AtomicU64,
}

impl Histogram {
    pub fn observe(&self, value: u64) {
        let bucket = (64 - value.leading_zeros() as usize).min(NUM_BUCKETS - 1);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn buckets(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

/// Metrics a replicated log updates while it is leader. Shared between the leader, its local
/// follower and the compaction manager.
#[derive(Debug, Default)]
pub struct ReplicatedLogMetrics {
    pub leader_number: Gauge,
    pub num_committed_entries: Counter,
    pub num_meta_entries: Counter,
    pub leader_append_entries_error_count: Counter,
    /// Round trip of AppendEntries as seen by the leader.
    pub append_entries_rtt_us: Histogram,
    /// Time the local follower takes to persist a batch.
    pub follower_append_entries_rt_us: Histogram,
    pub append_entries_num_entries: Histogram,
    pub append_entries_size: Histogram,
    pub inserts_bytes: Histogram,
    /// Time from insert until the entry is committed.
    pub inserts_rtt_us: Histogram,
    pub leader_num_in_memory_entries: Gauge,
    pub leader_num_in_memory_bytes: Gauge,
    pub compaction_num_entries: Counter,
}

impl ReplicatedLogMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            leader_number: self.leader_number.get(),
            num_committed_entries: self.num_committed_entries.get(),
            num_meta_entries: self.num_meta_entries.get(),
            leader_append_entries_error_count: self.leader_append_entries_error_count.get(),
            num_append_entries_requests: self.append_entries_num_entries.count(),
            num_inserts: self.inserts_bytes.count(),
            leader_num_in_memory_entries: self.leader_num_in_memory_entries.get(),
            leader_num_in_memory_bytes: self.leader_num_in_memory_bytes.get(),
            compaction_num_entries: self.compaction_num_entries.get(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub leader_number: i64,
    pub num_committed_entries: u64,
    pub num_meta_entries: u64,
    pub leader_append_entries_error_count: u64,
    pub num_append_entries_requests: u64,
    pub num_inserts: u64,
    pub leader_num_in_memory_entries: i64,
    pub leader_num_in_memory_bytes: i64,
    pub compaction_num_entries: u64,
}

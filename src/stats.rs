use serde::{Deserialize, Serialize};

/// Snapshot of the engine's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub window_size: i64,
    pub sequences_seen: u64,
    pub total_hits: u64,
    pub duplicate_hits: u64,
    pub max_pos_hits_exceeded: u64,
    pub max_pos_hits_threshold: usize,
    pub left_overload_count: u64,
    pub right_overload_count: u64,
    pub read_overload_threshold: usize,
    pub total_pairs: u64,
    /// `pair_count_histogram[n]` = number of evicted hits that had `n` candidate mates
    pub pair_count_histogram: Vec<u64>,
}

impl Diagnostics {
    pub fn new(window_size: i64, max_pos_hits_threshold: usize, read_overload_threshold: usize) -> Self {
        Self {
            window_size,
            max_pos_hits_threshold,
            read_overload_threshold,
            // one bucket per count up to the limit, plus one for the overflowed scan
            pair_count_histogram: vec![0; read_overload_threshold + 2],
            ..Self::default()
        }
    }

    pub fn record_pair_count(&mut self, pair_count: usize) {
        let bucket = pair_count.min(self.pair_count_histogram.len() - 1);
        self.pair_count_histogram[bucket] += 1;
    }

    /// Fold another engine's counters into this one
    pub fn merge(&mut self, other: &Diagnostics) {
        self.window_size = self.window_size.max(other.window_size);
        self.sequences_seen += other.sequences_seen;
        self.total_hits += other.total_hits;
        self.duplicate_hits += other.duplicate_hits;
        self.max_pos_hits_exceeded += other.max_pos_hits_exceeded;
        self.max_pos_hits_threshold = self.max_pos_hits_threshold.max(other.max_pos_hits_threshold);
        self.left_overload_count += other.left_overload_count;
        self.right_overload_count += other.right_overload_count;
        self.read_overload_threshold = self.read_overload_threshold.max(other.read_overload_threshold);
        self.total_pairs += other.total_pairs;
        if self.pair_count_histogram.len() < other.pair_count_histogram.len() {
            self.pair_count_histogram.resize(other.pair_count_histogram.len(), 0);
        }
        for (count, value) in other.pair_count_histogram.iter().enumerate() {
            self.pair_count_histogram[count] += value;
        }
    }
}

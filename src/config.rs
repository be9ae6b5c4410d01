//! Engine configuration
//!
//! Every threshold the engine uses is carried here and validated once at
//! construction. Derived sizes (window, index, overflow caps) are computed
//! from the configured fragment and read lengths.

use crate::error::PairingError;
use serde::{Deserialize, Serialize};

/// Smallest per-position hit cap used when the default is derived from coverage
pub const MIN_HITS_PER_POSITION: usize = 64;
/// Upper bound on the coverage-derived per-position hit cap
pub const MAX_DERIVED_HITS_PER_POSITION: usize = 1 << 16;
/// Mate index buckets per window position, before rounding to a power of two
pub const INDEX_OVERSIZE_FACTOR: usize = 30;
/// Largest mate index allowed, in buckets
pub const MAX_INDEX_SIZE: usize = 1 << 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_fragment_length: i64,
    pub max_fragment_length: i64,
    pub max_read_length: i64,
    /// Extra positions of out-of-order arrival tolerated on top of one read length
    pub uncertainty_margin: i64,
    pub max_hits_per_position: Option<usize>,
    pub max_hits_per_read: Option<usize>,
    /// Capacity of each slot of the deferred-pair window (defaults to the hit cap)
    pub max_pairs_per_position: Option<usize>,
    pub genome_length: u64,
    pub read_count: u64,
    /// Pools that grew past this many records are shrunk back on eviction
    pub slot_trim_threshold: usize,
    /// Number of overflow occurrences logged before going quiet
    pub overflow_log_limit: usize,
    /// Which arm is treated as the left end when both ends start at the same position
    pub tie_left_arm: bool,
    /// Run the integrity check after every window advance
    pub paranoid: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_fragment_length: 0,
            max_fragment_length: 1000,
            max_read_length: 150,
            uncertainty_margin: 64,
            max_hits_per_position: None,
            max_hits_per_read: None,
            max_pairs_per_position: None,
            genome_length: 0,
            read_count: 0,
            slot_trim_threshold: 100,
            overflow_log_limit: 5,
            tie_left_arm: false,
            paranoid: false,
        }
    }
}

impl EngineConfig {
    pub fn new(min_fragment_length: i64, max_fragment_length: i64, max_read_length: i64) -> Self {
        Self {
            min_fragment_length,
            max_fragment_length,
            max_read_length,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PairingError> {
        if self.min_fragment_length < 0 {
            return Err(PairingError::InvalidConfig(format!(
                "min_fragment_length must be >= 0, got {}",
                self.min_fragment_length
            )));
        }
        if self.max_fragment_length < self.min_fragment_length {
            return Err(PairingError::InvalidConfig(format!(
                "max_fragment_length ({}) must be >= min_fragment_length ({})",
                self.max_fragment_length, self.min_fragment_length
            )));
        }
        if self.max_read_length <= 0 {
            return Err(PairingError::InvalidConfig(format!(
                "max_read_length must be > 0, got {}",
                self.max_read_length
            )));
        }
        if self.uncertainty_margin < 0 {
            return Err(PairingError::InvalidConfig(format!(
                "uncertainty_margin must be >= 0, got {}",
                self.uncertainty_margin
            )));
        }
        for (name, value) in [
            ("max_hits_per_position", self.max_hits_per_position),
            ("max_hits_per_read", self.max_hits_per_read),
            ("max_pairs_per_position", self.max_pairs_per_position),
        ] {
            if value == Some(0) {
                return Err(PairingError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }
        if self.window_size() > i32::MAX as i64 {
            return Err(PairingError::InvalidConfig(format!(
                "window size {} is too large",
                self.window_size()
            )));
        }
        let buckets = (self.window_size() as usize).saturating_mul(INDEX_OVERSIZE_FACTOR);
        if buckets > MAX_INDEX_SIZE {
            return Err(PairingError::InvalidConfig(format!(
                "window size {} needs a mate index of {} buckets (at most {} allowed)",
                self.window_size(),
                buckets,
                MAX_INDEX_SIZE
            )));
        }
        Ok(())
    }

    /// Window span large enough that both ends of any valid pair, plus about one
    /// read length of late arrival, are buffered at once.
    pub fn window_size(&self) -> i64 {
        self.max_fragment_length
            .saturating_add(self.max_read_length.max(64))
            .saturating_add(self.uncertainty_margin)
    }

    /// How far behind the current position a hit may still arrive
    pub fn out_of_order_tolerance(&self) -> i64 {
        self.window_size() - self.max_fragment_length
    }

    pub fn index_size(&self) -> usize {
        (self.window_size() as usize)
            .saturating_mul(INDEX_OVERSIZE_FACTOR)
            .min(MAX_INDEX_SIZE)
            .next_power_of_two()
    }

    /// Per-position hit cap; by default scales with the expected hit coverage
    pub fn hits_per_position_cap(&self) -> usize {
        if let Some(cap) = self.max_hits_per_position {
            return cap;
        }
        if self.genome_length == 0 || self.read_count == 0 {
            return MIN_HITS_PER_POSITION;
        }
        let coverage = (2 * self.read_count) as f64 / self.genome_length as f64;
        ((coverage * 10.0).ceil() as usize).clamp(MIN_HITS_PER_POSITION, MAX_DERIVED_HITS_PER_POSITION)
    }

    pub fn read_overload_limit(&self) -> usize {
        self.max_hits_per_read
            .unwrap_or(10 + self.window_size() as usize / 100)
    }

    pub fn pairs_per_position_cap(&self) -> usize {
        self.max_pairs_per_position
            .unwrap_or_else(|| self.hits_per_position_cap())
    }
}

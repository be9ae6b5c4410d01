//! Deferral window for resolved pairs
//!
//! A pair is resolved when its left end is evicted, but its right end may lie
//! up to one fragment length further along. Pairs are parked here under their
//! right position and released, first in first out, when the engine evicts
//! that position, so right-side output stays in reference order.

use crate::window::{window_position, BLACKLISTED};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatedPair {
    pub read_id: u32,
    pub left_pos: i64,
    pub left_rc: bool,
    pub right_pos: i64,
    pub right_rc: bool,
    pub arm_of_right: bool,
    pub fragment_length: i64,
    /// Alignment scores of the left and right ends, when they were computed
    pub cached_scores: (Option<i32>, Option<i32>),
}

#[derive(Debug, Default)]
struct PairSlot {
    pairs: Vec<MatedPair>,
    position: i64,
    in_use: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defer {
    Queued,
    /// The slot was full; everything parked there was dropped and the slot blacklisted
    Overflowed,
    Blacklisted,
}

pub struct PairWindow {
    slots: Vec<PairSlot>,
    capacity: i32,
    pending: usize,
}

impl PairWindow {
    /// `span` is the largest distance between a pair's left and right positions
    pub fn new(span: i64, capacity: usize) -> Self {
        let size = (span.max(0) + 1) as usize;
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, PairSlot::default);
        PairWindow {
            slots,
            capacity: capacity.min(i32::MAX as usize) as i32,
            pending: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of pairs waiting for their right position to be evicted
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn defer(&mut self, pair: MatedPair) -> Defer {
        let position = pair.right_pos;
        let slot_index = window_position(position, self.slots.len() as i64);
        let slot = &mut self.slots[slot_index];
        if slot.in_use > 0 && slot.position != position {
            // stale entries from a position the caller never flushed
            self.pending -= slot.pairs.len();
            slot.pairs.clear();
            slot.in_use = 0;
        }
        if slot.in_use == BLACKLISTED {
            return Defer::Blacklisted;
        }
        if slot.in_use >= self.capacity {
            self.pending -= slot.pairs.len();
            slot.pairs.clear();
            slot.position = position;
            slot.in_use = BLACKLISTED;
            return Defer::Overflowed;
        }
        slot.position = position;
        slot.pairs.push(pair);
        slot.in_use += 1;
        self.pending += 1;
        Defer::Queued
    }

    /// Release the pairs parked at `position`, in the order they were deferred
    pub fn drain_position(&mut self, position: i64) -> Vec<MatedPair> {
        let slot_index = window_position(position, self.slots.len() as i64);
        let slot = &mut self.slots[slot_index];
        if slot.in_use == BLACKLISTED {
            slot.in_use = 0;
            return Vec::new();
        }
        if slot.in_use == 0 || slot.position != position {
            return Vec::new();
        }
        slot.in_use = 0;
        self.pending -= slot.pairs.len();
        std::mem::take(&mut slot.pairs)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.pairs.clear();
            slot.in_use = 0;
        }
        self.pending = 0;
    }
}

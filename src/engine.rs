//! Sliding-window mate pairing
//!
//! Hits are buffered in a [`WindowBuffer`] and linked into a [`MateIndex`] as
//! they arrive. When the current position moves on, each slot that falls out
//! of the window is first searched for mates among the hits still indexed and
//! only then evicted, so every pair is considered exactly once, from its left
//! end, in reference order.

use crate::config::EngineConfig;
use crate::error::PairingError;
use crate::fragment::{five_prime, fragment_length, OrientationPolicy, ReadLengths};
use crate::hit::{AlignmentHandle, HitHandle, HitRecord};
use crate::integrity;
use crate::mate_index::{Insert, MateIndex};
use crate::stats::Diagnostics;
use crate::window::{Acquire, WindowBuffer};
use log::{debug, warn};

/// Template id passed by [`PairingEngine::end`]: no more sequences follow
pub const END_OF_TEMPLATES: i64 = i64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairDecision {
    Accept,
    Reject,
    /// The hit can never pair with anything; stop scanning its candidates
    RejectAndStop,
}

/// What to do with a candidate pair that passed orientation and fragment-length checks.
///
/// `hit` is always the left end of the pair. Only `check_pair` is required;
/// the other hooks let a policy flush state it defers to later positions.
pub trait PairingPolicy {
    fn check_pair(
        &mut self,
        hit: &mut HitRecord,
        mate: &mut HitRecord,
        fragment_length: i64,
    ) -> Result<PairDecision, PairingError>;

    /// Called for every live hit of a position once its mate search is done, before it is dropped
    fn hit_evicted(&mut self, _hit: &HitRecord) -> Result<(), PairingError> {
        Ok(())
    }

    /// Called once per position as the window slides past it, after its hits are gone
    fn position_evicted(&mut self, _position: i64) -> Result<(), PairingError> {
        Ok(())
    }

    /// Called once per sequence switch, after the window has been flushed
    fn next_template(&mut self, _template_id: i64) -> Result<(), PairingError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unstarted,
    Active { current_pos: i64 },
    Flushing { current_pos: i64 },
    /// A collaborator failed; partial output has been written and every further call errors
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Linked,
    Duplicate,
    /// The hit's position overflowed, or is blacklisted from an earlier overflow
    Dropped,
}

pub struct PairingEngine<P, L, O> {
    config: EngineConfig,
    window: WindowBuffer,
    index: MateIndex,
    policy: P,
    read_lengths: L,
    orientation: O,
    state: EngineState,
    stats: Diagnostics,
    read_overload_limit: usize,
    out_of_order_tolerance: i64,
}

impl<P, L, O> PairingEngine<P, L, O>
where
    P: PairingPolicy,
    L: ReadLengths,
    O: OrientationPolicy,
{
    pub fn new(
        config: EngineConfig,
        policy: P,
        read_lengths: L,
        orientation: O,
    ) -> Result<Self, PairingError> {
        config.validate()?;

        let window_size = config.window_size();
        let capacity = config.hits_per_position_cap();
        let read_overload_limit = config.read_overload_limit();
        debug!(
            "Pairing engine: window {} positions, {} index buckets, {} hits per position, {} hits per read",
            window_size,
            config.index_size(),
            capacity,
            read_overload_limit
        );

        Ok(PairingEngine {
            window: WindowBuffer::new(window_size, capacity, config.slot_trim_threshold),
            index: MateIndex::new(config.index_size()),
            stats: Diagnostics::new(window_size, capacity, read_overload_limit),
            out_of_order_tolerance: config.out_of_order_tolerance(),
            read_overload_limit,
            config,
            policy,
            read_lengths,
            orientation,
            state: EngineState::Unstarted,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_position(&self) -> Option<i64> {
        match self.state {
            EngineState::Unstarted | EngineState::Poisoned => None,
            EngineState::Active { current_pos } | EngineState::Flushing { current_pos } => {
                Some(current_pos)
            }
        }
    }

    pub fn window_size(&self) -> i64 {
        self.window.window_size()
    }

    pub fn window(&self) -> &WindowBuffer {
        &self.window
    }

    pub fn index(&self) -> &MateIndex {
        &self.index
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn into_policy(self) -> P {
        self.policy
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.stats.clone()
    }

    /// Verify that window and index agree with each other
    pub fn check_integrity(&self) -> Result<(), PairingError> {
        integrity::check_integrity(&self.window, &self.index).map_err(PairingError::Integrity)
    }

    /// Buffer one hit, sliding the window forward first if `pos` is past the current position
    pub fn record(
        &mut self,
        arm: bool,
        reverse_complement: bool,
        read_id: u32,
        pos: i64,
    ) -> Result<RecordOutcome, PairingError> {
        self.record_hit(arm, reverse_complement, read_id, pos)
            .map(|(outcome, _)| outcome)
    }

    /// Like [`record`](Self::record), with the hit's alignment already known
    pub fn record_with_score(
        &mut self,
        arm: bool,
        reverse_complement: bool,
        read_id: u32,
        pos: i64,
        score: i32,
        alignment: Option<AlignmentHandle>,
    ) -> Result<RecordOutcome, PairingError> {
        let (outcome, handle) = self.record_hit(arm, reverse_complement, read_id, pos)?;
        if let Some(handle) = handle {
            self.window.record_mut(handle).cache_alignment(score, alignment);
        }
        Ok(outcome)
    }

    fn record_hit(
        &mut self,
        arm: bool,
        reverse_complement: bool,
        read_id: u32,
        pos: i64,
    ) -> Result<(RecordOutcome, Option<HitHandle>), PairingError> {
        let current = match self.state {
            EngineState::Flushing { .. } | EngineState::Poisoned => return Err(PairingError::Poisoned),
            EngineState::Unstarted => {
                self.check_position(pos)?;
                self.state = EngineState::Active { current_pos: pos };
                self.stats.sequences_seen += 1;
                debug!("Starting sequence {} at position {}", self.stats.sequences_seen, pos);
                pos
            }
            EngineState::Active { current_pos } => {
                self.check_position(pos)?;
                current_pos
            }
        };

        if pos < current.saturating_sub(self.out_of_order_tolerance) {
            return Err(PairingError::OutOfOrderInput {
                position: pos,
                current,
                tolerance: self.out_of_order_tolerance,
            });
        }
        if pos > current {
            self.advance_window(current, pos)?;
        }

        self.stats.total_hits += 1;
        let slot = self.window.window_position(pos);
        match self.window.acquire(slot, &mut self.index) {
            Acquire::Granted(handle) => {
                self.window
                    .record_mut(handle)
                    .reset(arm, reverse_complement, read_id, pos);
                match self.index.insert_sorted(&mut self.window, handle) {
                    Insert::Linked => Ok((RecordOutcome::Linked, Some(handle))),
                    Insert::Duplicate => {
                        self.window.release(slot);
                        self.stats.duplicate_hits += 1;
                        Ok((RecordOutcome::Duplicate, None))
                    }
                }
            }
            Acquire::Overflowed => {
                self.stats.max_pos_hits_exceeded += 1;
                if self.stats.max_pos_hits_exceeded <= self.config.overflow_log_limit as u64 {
                    warn!(
                        "More than {} hits at position {}; dropping all hits there until the window moves on",
                        self.window.capacity(),
                        pos
                    );
                    if self.stats.max_pos_hits_exceeded == self.config.overflow_log_limit as u64 {
                        warn!("Further per-position overflows will not be logged");
                    }
                }
                Ok((RecordOutcome::Dropped, None))
            }
            Acquire::Blacklisted => Ok((RecordOutcome::Dropped, None)),
        }
    }

    /// Slide the window forward to `new_pos`, pairing and evicting every slot that falls out
    pub fn advance_to(&mut self, new_pos: i64) -> Result<(), PairingError> {
        match self.state {
            EngineState::Unstarted => Ok(()),
            EngineState::Flushing { .. } | EngineState::Poisoned => Err(PairingError::Poisoned),
            EngineState::Active { current_pos } => {
                self.check_position(new_pos)?;
                self.advance_window(current_pos, new_pos)
            }
        }
    }

    /// Positions must leave room for a full window on either side
    fn check_position(&self, pos: i64) -> Result<(), PairingError> {
        let window_size = self.window.window_size();
        if pos < i64::MIN + window_size || pos > i64::MAX - window_size {
            return Err(PairingError::PositionOutOfRange {
                position: pos,
                window_size,
            });
        }
        Ok(())
    }

    /// Slide the window; any failure poisons the engine since part of a slot may already be written
    fn advance_window(&mut self, current: i64, new_pos: i64) -> Result<(), PairingError> {
        let result = self.slide_window(current, new_pos);
        if result.is_err() {
            self.state = EngineState::Poisoned;
        }
        result
    }

    fn slide_window(&mut self, mut current: i64, new_pos: i64) -> Result<(), PairingError> {
        if new_pos <= current {
            return Ok(());
        }
        let window_size = self.window.window_size();
        // after one full turn every slot has been evicted, so any further gap is empty
        let steps = new_pos.saturating_sub(current).min(window_size);
        for _ in 0..steps {
            let next = current + 1;
            let slot = self.window.window_position(next);
            let evicted = next - window_size;
            if self.window.slot(slot).live_count() > 0 {
                self.find_new_mates(slot)?;
                for index in 0..self.window.slot(slot).live_count() {
                    let hit = self.window.record(HitHandle::new(slot, index));
                    self.policy.hit_evicted(hit)?;
                }
            }
            self.window.evict(slot, evicted, &mut self.index);
            self.policy.position_evicted(evicted)?;
            current = next;
            self.set_current(current);
        }
        self.set_current(new_pos);

        if self.config.paranoid {
            self.check_integrity()?;
        }
        Ok(())
    }

    fn set_current(&mut self, pos: i64) {
        match &mut self.state {
            EngineState::Active { current_pos } | EngineState::Flushing { current_pos } => {
                *current_pos = pos
            }
            EngineState::Unstarted | EngineState::Poisoned => {}
        }
    }

    /// Search mates for every live hit of an about-to-be-evicted slot
    fn find_new_mates(&mut self, slot: usize) -> Result<(), PairingError> {
        let limit = self.read_overload_limit;
        let min_fragment = self.config.min_fragment_length;
        let max_fragment = self.config.max_fragment_length;
        let tie_left_arm = self.config.tie_left_arm;

        for index in 0..self.window.slot(slot).live_count() {
            let handle = HitHandle::new(slot, index);
            let hit = self.window.record(handle);
            let (read_id, arm, rc, start) = (
                hit.read_id(),
                hit.arm(),
                hit.reverse_complement(),
                hit.template_start(),
            );

            let own_bucket = self.index.bucket(read_id, arm);
            let multiplicity = self
                .index
                .chain(&self.window, own_bucket)
                .filter(|&other| {
                    let other = self.window.record(other);
                    other.read_id() == read_id && other.arm() == arm
                })
                .take(limit + 1)
                .count();
            if multiplicity > limit {
                self.stats.left_overload_count += 1;
                continue;
            }

            let hit_len = self.read_lengths.read_length(read_id, arm);
            let hit_5p = five_prime(start, hit_len, rc);
            let mut pair_count = 0usize;
            let mut cursor = self.index.head(self.index.bucket(read_id, !arm));
            while let Some(mate_handle) = cursor {
                let mate = self.window.record(mate_handle);
                cursor = mate.next;
                if mate.read_id() != read_id || mate.arm() == arm {
                    continue;
                }
                let (mate_start, mate_rc) = (mate.template_start(), mate.reverse_complement());
                if mate_start < start || (mate_start == start && arm != tie_left_arm) {
                    continue;
                }
                if mate_start - start > max_fragment {
                    break;
                }

                let mate_len = self.read_lengths.read_length(read_id, !arm);
                let mate_5p = five_prime(mate_start, mate_len, mate_rc);
                if !self.orientation.orientation_ok(hit_5p, rc, mate_5p, mate_rc) {
                    continue;
                }
                let fragment = fragment_length(start, hit_len, mate_start, mate_len);
                if fragment < min_fragment || fragment > max_fragment {
                    continue;
                }

                pair_count += 1;
                if pair_count > limit {
                    self.stats.right_overload_count += 1;
                    break;
                }
                let (hit, mate) = self.window.pair_mut(handle, mate_handle);
                match self.policy.check_pair(hit, mate, fragment)? {
                    PairDecision::Accept => self.stats.total_pairs += 1,
                    PairDecision::Reject => {}
                    PairDecision::RejectAndStop => break,
                }
            }
            self.stats.record_pair_count(pair_count);
        }
        Ok(())
    }

    /// Flush the window, forget every read of the finished sequence and forward the switch
    pub fn next_template(&mut self, template_id: i64) -> Result<(), PairingError> {
        match self.state {
            EngineState::Flushing { .. } | EngineState::Poisoned => return Err(PairingError::Poisoned),
            EngineState::Active { current_pos } => {
                self.state = EngineState::Flushing { current_pos };
                // positions are bounded by check_position, so this cannot overflow
                let target = current_pos + self.window.window_size();
                self.advance_window(current_pos, target)?;
                debug!(
                    "Finished sequence {}: {} hits, {} pairs so far",
                    self.stats.sequences_seen, self.stats.total_hits, self.stats.total_pairs
                );
            }
            EngineState::Unstarted => {}
        }
        self.index.clear();
        self.window.reset();
        self.state = EngineState::Unstarted;
        if let Err(e) = self.policy.next_template(template_id) {
            self.state = EngineState::Poisoned;
            return Err(e);
        }
        Ok(())
    }

    /// Flush the last sequence; no further sequences follow
    pub fn end(&mut self) -> Result<(), PairingError> {
        self.next_template(END_OF_TEMPLATES)
    }
}

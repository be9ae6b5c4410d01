//! Pairing policies and the collaborators they hand results to
//!
//! - [`MatedOutputPolicy`] aligns lazily, filters on score and defers the
//!   right-side emission of each accepted pair.
//! - [`UnfilteredPolicy`] accepts every geometric pair and reports per-hit
//!   mate counts for the caller to filter later.

pub mod mated;
pub mod unfiltered;

pub use mated::MatedOutputPolicy;
pub use unfiltered::UnfilteredPolicy;

use crate::error::PairingError;
use crate::hit::{AlignmentHandle, HitKey, HitRecord};
use crate::pair_window::MatedPair;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io;

/// Downstream record writer
pub trait PairWriter {
    /// Left end of an accepted pair, emitted as soon as the pair is resolved
    fn write_pair_left(&mut self, _pair: &MatedPair) -> io::Result<()> {
        Ok(())
    }

    /// A pair whose right end has now slid out of the window
    fn write_resolved_pair(&mut self, pair: MatedPair) -> io::Result<()>;

    fn write_hit_status(&mut self, _hit: HitKey, _status: HitStatus) -> io::Result<()> {
        Ok(())
    }

    /// Forwarded once per sequence switch so the writer can flush per-sequence state
    fn next_template(&mut self, template_id: i64) -> io::Result<()>;
}

/// How many mates a hit was paired with, as reported by [`UnfilteredPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HitStatus {
    pub mate_count: u32,
}

impl HitStatus {
    pub fn mated(&self) -> bool {
        self.mate_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentResult {
    pub score: i32,
    pub alignment: Option<AlignmentHandle>,
}

/// Upstream aligner, asked at most once per buffered hit
pub trait HitAligner {
    fn align(&mut self, hit: &HitRecord) -> Result<AlignmentResult, PairingError>;
}

impl<F> HitAligner for F
where
    F: FnMut(&HitRecord) -> Result<AlignmentResult, PairingError>,
{
    fn align(&mut self, hit: &HitRecord) -> Result<AlignmentResult, PairingError> {
        self(hit)
    }
}

/// Scores supplied alongside the hits, with a default for hits that have none
#[derive(Debug, Clone, Default)]
pub struct PrecomputedScores {
    scores: FxHashMap<HitKey, i32>,
    default_score: i32,
}

impl PrecomputedScores {
    pub fn new(default_score: i32) -> Self {
        Self {
            scores: FxHashMap::default(),
            default_score,
        }
    }

    pub fn insert(&mut self, hit: HitKey, score: i32) {
        self.scores.insert(hit, score);
    }
}

impl HitAligner for PrecomputedScores {
    fn align(&mut self, hit: &HitRecord) -> Result<AlignmentResult, PairingError> {
        Ok(AlignmentResult {
            score: self
                .scores
                .get(&hit.key())
                .copied()
                .unwrap_or(self.default_score),
            alignment: None,
        })
    }
}

/// Writer that keeps everything in memory
#[derive(Debug, Default)]
pub struct PairCollector {
    pub left: Vec<MatedPair>,
    pub resolved: Vec<MatedPair>,
    pub statuses: Vec<(HitKey, HitStatus)>,
    pub templates: Vec<i64>,
}

impl PairWriter for PairCollector {
    fn write_pair_left(&mut self, pair: &MatedPair) -> io::Result<()> {
        self.left.push(pair.clone());
        Ok(())
    }

    fn write_resolved_pair(&mut self, pair: MatedPair) -> io::Result<()> {
        self.resolved.push(pair);
        Ok(())
    }

    fn write_hit_status(&mut self, hit: HitKey, status: HitStatus) -> io::Result<()> {
        self.statuses.push((hit, status));
        Ok(())
    }

    fn next_template(&mut self, template_id: i64) -> io::Result<()> {
        self.templates.push(template_id);
        Ok(())
    }
}

/// Build the pair record for an accepted `(left, right)` candidate
pub(crate) fn mated_pair(left: &HitRecord, right: &HitRecord, fragment_length: i64) -> MatedPair {
    MatedPair {
        read_id: left.read_id(),
        left_pos: left.template_start(),
        left_rc: left.reverse_complement(),
        right_pos: right.template_start(),
        right_rc: right.reverse_complement(),
        arm_of_right: right.arm(),
        fragment_length,
        cached_scores: (left.cached_score(), right.cached_score()),
    }
}

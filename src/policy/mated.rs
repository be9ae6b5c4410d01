use crate::config::EngineConfig;
use crate::engine::{PairDecision, PairingPolicy};
use crate::error::PairingError;
use crate::hit::HitRecord;
use crate::pair_window::{Defer, PairWindow};
use crate::policy::{mated_pair, HitAligner, PairWriter};
use log::warn;

/// Score-filtered pairing with deferred right-side output.
///
/// Each hit is aligned at most once; the score is cached in the record so
/// that every later candidate pairing reuses it.
pub struct MatedOutputPolicy<A, W> {
    aligner: A,
    writer: W,
    pairs: PairWindow,
    min_score: i32,
    overflow_log_limit: usize,
    pair_window_overflows: u64,
    accepted: u64,
}

impl<A: HitAligner, W: PairWriter> MatedOutputPolicy<A, W> {
    pub fn new(config: &EngineConfig, aligner: A, writer: W, min_score: i32) -> Self {
        Self {
            aligner,
            writer,
            pairs: PairWindow::new(config.max_fragment_length, config.pairs_per_position_cap()),
            min_score,
            overflow_log_limit: config.overflow_log_limit,
            pair_window_overflows: 0,
            accepted: 0,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn pair_window_overflows(&self) -> u64 {
        self.pair_window_overflows
    }

    /// Pairs resolved on the left but not yet emitted on the right
    pub fn pending(&self) -> usize {
        self.pairs.pending()
    }

    fn score(&mut self, hit: &mut HitRecord) -> Result<i32, PairingError> {
        if let Some(score) = hit.cached_score() {
            return Ok(score);
        }
        let result = self.aligner.align(hit)?;
        hit.cache_alignment(result.score, result.alignment);
        Ok(result.score)
    }
}

impl<A: HitAligner, W: PairWriter> PairingPolicy for MatedOutputPolicy<A, W> {
    fn check_pair(
        &mut self,
        hit: &mut HitRecord,
        mate: &mut HitRecord,
        fragment_length: i64,
    ) -> Result<PairDecision, PairingError> {
        if self.score(hit)? < self.min_score {
            return Ok(PairDecision::RejectAndStop);
        }
        if self.score(mate)? < self.min_score {
            return Ok(PairDecision::Reject);
        }

        let pair = mated_pair(hit, mate, fragment_length);
        self.writer.write_pair_left(&pair)?;
        let (read_id, right_pos) = (pair.read_id, pair.right_pos);
        match self.pairs.defer(pair) {
            Defer::Queued | Defer::Blacklisted => {}
            Defer::Overflowed => {
                self.pair_window_overflows += 1;
                if self.pair_window_overflows <= self.overflow_log_limit as u64 {
                    warn!(
                        "Too many pairs ending at position {} (read {}); dropping their right-side output",
                        right_pos, read_id
                    );
                }
            }
        }
        self.accepted += 1;
        Ok(PairDecision::Accept)
    }

    fn position_evicted(&mut self, position: i64) -> Result<(), PairingError> {
        for pair in self.pairs.drain_position(position) {
            self.writer.write_resolved_pair(pair)?;
        }
        Ok(())
    }

    fn next_template(&mut self, template_id: i64) -> Result<(), PairingError> {
        if self.pairs.pending() > 0 {
            warn!(
                "{} deferred pairs were never released before sequence switch",
                self.pairs.pending()
            );
            self.pairs.clear();
        }
        self.writer.next_template(template_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PairingEngine;
    use crate::fragment::{FixedReadLengths, MachineOrientation};
    use crate::policy::{AlignmentResult, PairCollector, PrecomputedScores};

    fn config() -> EngineConfig {
        let mut config = EngineConfig::new(0, 100, 20);
        config.uncertainty_margin = 16;
        config.paranoid = true;
        config
    }

    #[test]
    fn test_right_side_waits_for_right_eviction() {
        let config = config();
        let policy = MatedOutputPolicy::new(&config, PrecomputedScores::new(30), PairCollector::default(), 10);
        let mut engine = PairingEngine::new(
            config,
            policy,
            FixedReadLengths::uniform(20),
            MachineOrientation::ForwardReverse,
        )
        .unwrap();
        let window_size = engine.window_size();

        engine.record(false, false, 1, 0).unwrap();
        engine.record(true, true, 1, 40).unwrap();
        engine.advance_to(window_size).unwrap();
        assert_eq!(engine.policy().writer().left.len(), 1);
        assert!(engine.policy().writer().resolved.is_empty());
        assert_eq!(engine.policy().pending(), 1);

        engine.advance_to(window_size + 40).unwrap();
        let resolved = &engine.policy().writer().resolved;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].left_pos, 0);
        assert_eq!(resolved[0].right_pos, 40);
        assert_eq!(resolved[0].fragment_length, 60);
        assert_eq!(resolved[0].cached_scores, (Some(30), Some(30)));
        assert!(resolved[0].arm_of_right);
    }

    #[test]
    fn test_low_scores_reject() {
        let config = config();
        let mut scores = PrecomputedScores::new(30);
        scores.insert(HitRecord::new(true, true, 1, 40).key(), 5);
        scores.insert(HitRecord::new(false, false, 2, 10).key(), 5);
        let policy = MatedOutputPolicy::new(&config, scores, PairCollector::default(), 10);
        let mut engine = PairingEngine::new(
            config,
            policy,
            FixedReadLengths::uniform(20),
            MachineOrientation::ForwardReverse,
        )
        .unwrap();

        engine.record(false, false, 1, 0).unwrap();
        engine.record(false, false, 2, 10).unwrap();
        engine.record(true, true, 1, 40).unwrap(); // low-scoring mate
        engine.record(true, true, 1, 50).unwrap();
        engine.record(true, true, 2, 50).unwrap(); // partner of a low-scoring left end
        engine.end().unwrap();

        let resolved: Vec<(u32, i64)> = engine
            .policy()
            .writer()
            .resolved
            .iter()
            .map(|p| (p.read_id, p.right_pos))
            .collect();
        assert_eq!(resolved, vec![(1, 50)]);
        assert_eq!(engine.policy().accepted(), 1);
        assert_eq!(engine.diagnostics().total_pairs, 1);
        assert_eq!(engine.policy().writer().templates.len(), 1);
    }

    #[test]
    fn test_each_hit_aligned_once() {
        let config = config();
        let mut calls = 0usize;
        let aligner = |_: &HitRecord| -> Result<AlignmentResult, PairingError> {
            calls += 1;
            Ok(AlignmentResult {
                score: 20,
                alignment: None,
            })
        };
        let policy = MatedOutputPolicy::new(&config, aligner, PairCollector::default(), 10);
        let mut engine = PairingEngine::new(
            config,
            policy,
            FixedReadLengths::uniform(20),
            MachineOrientation::Any,
        )
        .unwrap();
        engine.record(false, false, 3, 0).unwrap();
        for pos in [10, 20, 30] {
            engine.record(true, true, 3, pos).unwrap();
        }
        engine.end().unwrap();
        let resolved = engine.into_policy().into_writer().resolved.len();
        assert_eq!(resolved, 3);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_primed_score_skips_aligner() {
        let config = config();
        let aligner = |_: &HitRecord| -> Result<AlignmentResult, PairingError> {
            Err(PairingError::Io(std::io::Error::other("aligner should not run")))
        };
        let policy = MatedOutputPolicy::new(&config, aligner, PairCollector::default(), 10);
        let mut engine = PairingEngine::new(
            config,
            policy,
            FixedReadLengths::uniform(20),
            MachineOrientation::Any,
        )
        .unwrap();
        engine.record_with_score(false, false, 3, 0, 50, None).unwrap();
        engine.record_with_score(true, true, 3, 30, 50, None).unwrap();
        engine.end().unwrap();
        assert_eq!(engine.policy().writer().resolved.len(), 1);
    }

    #[test]
    fn test_aligner_failure_propagates() {
        let config = config();
        let aligner = |_: &HitRecord| -> Result<AlignmentResult, PairingError> {
            Err(PairingError::Io(std::io::Error::other("disk gone")))
        };
        let policy = MatedOutputPolicy::new(&config, aligner, PairCollector::default(), 10);
        let mut engine = PairingEngine::new(
            config,
            policy,
            FixedReadLengths::uniform(20),
            MachineOrientation::Any,
        )
        .unwrap();
        engine.record(false, false, 3, 0).unwrap();
        engine.record(true, true, 3, 30).unwrap();
        assert!(matches!(engine.end(), Err(PairingError::Io(_))));
        assert!(matches!(
            engine.record(false, false, 4, 500),
            Err(PairingError::Poisoned)
        ));
    }
}

use crate::engine::{PairDecision, PairingPolicy};
use crate::error::PairingError;
use crate::hit::{HitKey, HitRecord};
use crate::policy::{mated_pair, HitStatus, PairWriter};
use log::debug;
use rustc_hash::FxHashMap;

/// Accepts every pair that passes the geometric checks.
///
/// Pairs are written straight away. Mate counts live in a side table keyed
/// by hit and each hit's status is written as it is evicted, by which point
/// every pair involving it has been seen. Hits that never pair are reported
/// with a count of zero.
pub struct UnfilteredPolicy<W> {
    writer: W,
    mate_counts: FxHashMap<HitKey, u32>,
}

impl<W: PairWriter> UnfilteredPolicy<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            mate_counts: FxHashMap::default(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Mate count so far of a buffered hit; `None` once reported or while it has no mates
    pub fn status(&self, hit: &HitKey) -> Option<HitStatus> {
        self.mate_counts
            .get(hit)
            .map(|&mate_count| HitStatus { mate_count })
    }

    fn mark(&mut self, hit: HitKey) {
        *self.mate_counts.entry(hit).or_insert(0) += 1;
    }
}

impl<W: PairWriter> PairingPolicy for UnfilteredPolicy<W> {
    fn check_pair(
        &mut self,
        hit: &mut HitRecord,
        mate: &mut HitRecord,
        fragment_length: i64,
    ) -> Result<PairDecision, PairingError> {
        self.mark(hit.key());
        self.mark(mate.key());
        self.writer
            .write_resolved_pair(mated_pair(hit, mate, fragment_length))?;
        Ok(PairDecision::Accept)
    }

    fn hit_evicted(&mut self, hit: &HitRecord) -> Result<(), PairingError> {
        let key = hit.key();
        let mate_count = self.mate_counts.remove(&key).unwrap_or(0);
        self.writer.write_hit_status(key, HitStatus { mate_count })?;
        Ok(())
    }

    fn next_template(&mut self, template_id: i64) -> Result<(), PairingError> {
        // only mates of hits later dropped by an overflowing position can be left here
        if !self.mate_counts.is_empty() {
            debug!(
                "Dropping mate counts of {} hits lost to position overflow",
                self.mate_counts.len()
            );
            self.mate_counts.clear();
        }
        self.writer.next_template(template_id)?;
        Ok(())
    }
}

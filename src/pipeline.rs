//! Per-reference driver used by the command-line tool
//!
//! Each reference sequence gets its own engine; references are paired in
//! parallel and collected back in natural name order.

use crate::config::EngineConfig;
use crate::engine::{PairingEngine, PairingPolicy};
use crate::error::PairingError;
use crate::fragment::{MachineOrientation, ReadLengthTable};
use crate::hit::HitKey;
use crate::pair_window::MatedPair;
use crate::policy::{
    HitStatus, MatedOutputPolicy, PairCollector, PrecomputedScores, UnfilteredPolicy,
};
use crate::stats::Diagnostics;
use crate::tsv::HitLine;
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct PairingOptions {
    pub config: EngineConfig,
    pub orientation: MachineOrientation,
    pub min_score: i32,
    /// Skip score filtering and pass every geometric pair through
    pub unfiltered: bool,
}

#[derive(Debug)]
pub struct ReferenceResult {
    pub reference: String,
    pub pairs: Vec<MatedPair>,
    /// Per-hit mate counts in eviction order; only filled in unfiltered mode
    pub statuses: Vec<(HitKey, HitStatus)>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Serialize)]
pub struct ReferenceSummary {
    pub reference: String,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub total: Diagnostics,
    pub references: Vec<ReferenceSummary>,
}

impl RunSummary {
    pub fn from_results(results: &[ReferenceResult]) -> Self {
        let mut total = Diagnostics::default();
        for result in results {
            total.merge(&result.diagnostics);
        }
        RunSummary {
            total,
            references: results
                .iter()
                .map(|result| ReferenceSummary {
                    reference: result.reference.clone(),
                    diagnostics: result.diagnostics.clone(),
                })
                .collect(),
        }
    }
}

/// Split hits by reference, keeping each reference's input order
pub fn group_by_reference(hits: Vec<HitLine>) -> FxHashMap<String, Vec<HitLine>> {
    let mut groups: FxHashMap<String, Vec<HitLine>> = FxHashMap::default();
    for hit in hits {
        groups.entry(hit.reference.clone()).or_default().push(hit);
    }
    groups
}

/// Pair every reference in parallel; results come back in natural reference order
pub fn pair_references(
    groups: FxHashMap<String, Vec<HitLine>>,
    options: &PairingOptions,
) -> Result<Vec<ReferenceResult>, PairingError> {
    let mut groups: Vec<(String, Vec<HitLine>)> = groups.into_iter().collect();
    groups.sort_by(|a, b| natord::compare(&a.0, &b.0));

    let results = groups
        .into_par_iter()
        .enumerate()
        .map(|(template_id, (reference, hits))| {
            pair_reference(&reference, hits, template_id as i64, options)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pairs: usize = results.iter().map(|r| r.pairs.len()).sum();
    info!("Paired {} references, {} pairs", results.len(), pairs);
    Ok(results)
}

/// Run one reference's hits through a fresh engine
pub fn pair_reference(
    reference: &str,
    mut hits: Vec<HitLine>,
    template_id: i64,
    options: &PairingOptions,
) -> Result<ReferenceResult, PairingError> {
    hits.sort_by_key(|hit| hit.start);

    let mut config = options.config.clone();
    let mut read_lengths = ReadLengthTable::new(config.max_read_length);
    for hit in &hits {
        read_lengths.insert(hit.read_id, hit.arm, hit.read_length);
    }
    config.max_read_length = config.max_read_length.max(read_lengths.max_length());
    // coverage-derived hit caps need both, so estimate them from this reference's hits
    if config.genome_length == 0 {
        config.genome_length = hits
            .iter()
            .map(|hit| (hit.start + hit.read_length).max(0) as u64)
            .max()
            .unwrap_or(0);
    }
    if config.read_count == 0 {
        config.read_count = hits.len() as u64 / 2;
    }
    debug!(
        "Pairing {} hits on {} (window {})",
        hits.len(),
        reference,
        config.window_size()
    );

    let (pairs, statuses, diagnostics) = if options.unfiltered {
        let policy = UnfilteredPolicy::new(PairCollector::default());
        let mut engine = PairingEngine::new(config, policy, read_lengths, options.orientation)?;
        drive(&mut engine, &hits, template_id)?;
        let diagnostics = engine.diagnostics();
        let writer = engine.into_policy().into_writer();
        (writer.resolved, writer.statuses, diagnostics)
    } else {
        let policy = MatedOutputPolicy::new(
            &config,
            PrecomputedScores::new(0),
            PairCollector::default(),
            options.min_score,
        );
        let mut engine = PairingEngine::new(config, policy, read_lengths, options.orientation)?;
        drive(&mut engine, &hits, template_id)?;
        let diagnostics = engine.diagnostics();
        (engine.into_policy().into_writer().resolved, Vec::new(), diagnostics)
    };

    Ok(ReferenceResult {
        reference: reference.to_string(),
        pairs,
        statuses,
        diagnostics,
    })
}

fn drive<P: PairingPolicy>(
    engine: &mut PairingEngine<P, ReadLengthTable, MachineOrientation>,
    hits: &[HitLine],
    template_id: i64,
) -> Result<(), PairingError> {
    for hit in hits {
        match hit.score {
            Some(score) => engine.record_with_score(
                hit.arm,
                hit.reverse_complement,
                hit.read_id,
                hit.start,
                score,
                None,
            )?,
            None => engine.record(hit.arm, hit.reverse_complement, hit.read_id, hit.start)?,
        };
    }
    engine.next_template(template_id)
}

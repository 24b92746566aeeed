use rustc_hash::FxHashMap;

use crate::consensus::engine::{pileup_base_full, tally_uncollapsed, vote_column, FamilyColumnObservation, PositionConsensus, VoteThresholds};
use crate::consensus::table::ConsensusRow;
use crate::errs::DebarcerError;
use crate::pileup::reader::{pileup_columns, PileupColumn, PileupOptions};
use crate::reference::ReferenceFasta;
use crate::umi::UmiIndex;
use crate::util::Region;

/// Family-size thresholds and the shared consensus-vote acceptance
/// thresholds the collapsed view is computed under.
#[derive(Debug, Clone)]
pub struct CollapseConfig {
    pub family_sizes: Vec<u32>,
    pub pos_threshold: u32,
    pub vote: VoteThresholds,
}

fn resolve_column_ref_window(reference: &ReferenceFasta, contig: &str, pos: u32, indel: i32) -> Result<(char, String), DebarcerError> {
    let anchor = reference.base_at(contig, pos)?;
    let window = if indel < 0 {
        reference.fetch(contig, pos, pos + (-indel) as u32 + 1)?
    } else {
        anchor.to_string()
    };
    Ok((anchor, window))
}

fn column_allele(reference_window: &str, anchor: char, read: &crate::pileup::reader::PileupReadInfo) -> Option<crate::consensus::engine::PileupBase> {
    if read.is_del || read.is_refskip {
        return None;
    }
    let inserted = read.inserted_bases.as_deref().unwrap_or("");
    let obs_base = read.query_base.map(|b| b as char).unwrap_or(anchor);
    Some(pileup_base_full(reference_window, read.indel, anchor, obs_base, inserted))
}

/// Walks every pileup column of a region and produces one `ConsensusRow`
/// per `(position, family_size)` pair, for `family_size = 0` (uncollapsed)
/// plus every threshold in `config.family_sizes`.
pub fn compute_region_consensus(
    contig: &str,
    bam_columns_source: impl Fn() -> Result<Vec<PileupColumn>, DebarcerError>,
    reference: &ReferenceFasta,
    index: &UmiIndex,
    config: &CollapseConfig,
) -> Result<Vec<ConsensusRow>, DebarcerError> {
    let columns = bam_columns_source()?;
    let mut rows = Vec::new();

    for column in &columns {
        let max_indel = column.reads.iter().map(|r| r.indel).filter(|&i| i < 0).min().unwrap_or(0);
        let (anchor, ref_window) = resolve_column_ref_window(reference, contig, column.reference_pos, max_indel)?;

        let uncollapsed_alleles: Vec<_> = column
            .reads
            .iter()
            .filter_map(|read| column_allele(&ref_window, anchor, read))
            .collect();
        let uncollapsed = tally_uncollapsed(anchor, &uncollapsed_alleles);
        rows.push(consensus_to_row(contig, column.reference_pos, 0, &uncollapsed));

        for &f in &config.family_sizes {
            if f == 0 {
                continue;
            }
            let observations = collapsed_observations(column, &ref_window, anchor, index, contig, config.pos_threshold, f);
            let consensus = vote_column(anchor, &observations, &config.vote);
            rows.push(consensus_to_row(contig, column.reference_pos, f, &consensus));
        }
    }

    rows.sort_by(|a, b| a.position.cmp(&b.position).then(a.family_size.cmp(&b.family_size)));
    Ok(rows)
}

fn collapsed_observations(
    column: &PileupColumn,
    ref_window: &str,
    anchor: char,
    index: &UmiIndex,
    contig: &str,
    pos_threshold: u32,
    min_family_size: u32,
) -> Vec<FamilyColumnObservation> {
    let mut seen_families: FxHashMap<(String, u32), u32> = FxHashMap::default();
    let mut observations = Vec::new();

    for read in &column.reads {
        let Some(allele) = column_allele(ref_window, anchor, read) else { continue };
        for umi in &read.umis {
            let Some((parent, family)) = index.resolve_read_family(umi, contig, read.leftmost_pos, pos_threshold) else { continue };
            if family.count < min_family_size {
                continue;
            }
            let family_key = (parent, family.position);
            seen_families.insert(family_key.clone(), family.count);
            observations.push(FamilyColumnObservation {
                family_key,
                family_size: family.count,
                allele: allele.clone(),
            });
            // Each read contributes at most one vote per (parent, umi); the
            // remaining UMIs in a multi-UMI tag are alternative identities
            // for the same physical molecule, not independent votes.
            break;
        }
    }

    observations
}

fn categorize(ref_allele: &str, obs_allele: &str) -> char {
    if obs_allele.len() > ref_allele.len() {
        'I'
    } else if ref_allele.len() > obs_allele.len() {
        'D'
    } else {
        match obs_allele.chars().next() {
            Some('A') => 'A',
            Some('C') => 'C',
            Some('G') => 'G',
            Some('T') => 'T',
            _ => 'N',
        }
    }
}

fn consensus_to_row(contig: &str, position: u32, family_size: u32, consensus: &PositionConsensus) -> ConsensusRow {
    let mut a = 0u32;
    let mut c = 0u32;
    let mut g = 0u32;
    let mut t = 0u32;
    let mut i = 0u32;
    let mut d = 0u32;
    let mut n = 0u32;

    for ((ref_allele, obs_allele), count) in &consensus.counts {
        match categorize(ref_allele, obs_allele) {
            'A' => a += count,
            'C' => c += count,
            'G' => g += count,
            'T' => t += count,
            'I' => i += count,
            'D' => d += count,
            _ => n += count,
        }
    }

    ConsensusRow {
        contig: contig.to_owned(),
        position,
        ref_base: consensus.ref_base,
        a,
        c,
        g,
        t,
        i,
        d,
        n,
        raw_depth: consensus.raw_depth,
        cons_depth: consensus.cons_depth,
        family_size,
        ref_freq: consensus.ref_freq,
        mean_fam: consensus.mean_fam,
    }
}

use rustc_hash::FxHashMap;

/// A single column-level allele: a reference/observed pair following the
/// `PileupBase` semantics (§3). SNP: both length 1. Insertion of length k:
/// ref length 1, obs length k+1. Deletion of length k: ref length k+1, obs
/// length 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PileupBase {
    pub ref_allele: String,
    pub obs_allele: String,
}

/// Builds the full `PileupBase` for a column, given the reference sequence
/// slice starting at the column's position (needed to express deletions,
/// which span multiple reference bases), the read's own base at the anchor
/// position (needed to detect substitutions), and the inserted bases read
/// from the query sequence (needed to express insertions).
pub fn pileup_base_full(ref_window: &str, indel: i32, ref_base: char, obs_base: char, inserted: &str) -> PileupBase {
    if indel > 0 {
        PileupBase {
            ref_allele: ref_base.to_string(),
            obs_allele: format!("{obs_base}{inserted}"),
        }
    } else if indel < 0 {
        let del_len = (-indel) as usize;
        let ref_allele = if ref_window.len() >= del_len + 1 {
            ref_window[..del_len + 1].to_string()
        } else {
            ref_window.to_string()
        };
        PileupBase {
            ref_allele,
            obs_allele: obs_base.to_string(),
        }
    } else {
        PileupBase {
            ref_allele: ref_base.to_string(),
            obs_allele: obs_base.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoteThresholds {
    pub consensus_threshold: f64,
    pub count_threshold: u32,
}

/// A read's allele observation at a column once attributed to a family:
/// the family's identity, its overall (region-wide) size, and the allele
/// it observed at this position.
#[derive(Debug, Clone)]
pub struct FamilyColumnObservation {
    pub family_key: (String, u32),
    pub family_size: u32,
    pub allele: PileupBase,
}

/// Per-position, per-family-size-threshold statistics (§3 `PositionConsensus`).
#[derive(Debug, Clone)]
pub struct PositionConsensus {
    pub ref_base: char,
    pub counts: FxHashMap<(String, String), u32>,
    pub raw_depth: u32,
    pub cons_depth: u32,
    pub min_fam: u32,
    pub mean_fam: f64,
    pub ref_freq: f64,
}

fn ref_freq_pct(counts: &FxHashMap<(String, String), u32>, ref_base: char, depth: u32) -> f64 {
    if depth == 0 {
        return 0.0;
    }
    let ref_key = (ref_base.to_string(), ref_base.to_string());
    let ref_count = counts.get(&ref_key).copied().unwrap_or(0);
    (ref_count as f64 / depth as f64) * 100.0
}

/// The collapsed family vote (4.D): groups column observations by family,
/// picks each family's winning allele, accepts it if it clears both the
/// frequency and count thresholds, then aggregates accepted votes into a
/// single `PositionConsensus`. Pure — no BAM I/O — so it is directly
/// unit-testable against the spec's worked scenarios.
pub fn vote_column(ref_base: char, observations: &[FamilyColumnObservation], thresholds: &VoteThresholds) -> PositionConsensus {
    let mut per_family: FxHashMap<(String, u32), (u32, FxHashMap<(String, String), u32>)> = FxHashMap::default();
    for obs in observations {
        let entry = per_family.entry(obs.family_key.clone()).or_insert_with(|| (obs.family_size, FxHashMap::default()));
        *entry
            .1
            .entry((obs.allele.ref_allele.clone(), obs.allele.obs_allele.clone()))
            .or_insert(0) += 1;
    }

    let raw_depth: u32 = per_family.values().map(|(_, tally)| tally.values().sum::<u32>()).sum();

    let mut counts: FxHashMap<(String, String), u32> = FxHashMap::default();
    let mut cons_depth = 0u32;
    let mut contributing_sizes = Vec::new();

    for (family_size, tally) in per_family.values() {
        let total: u32 = tally.values().sum();
        if total == 0 {
            continue;
        }
        let (winner, &winner_count) = tally
            .iter()
            .max_by(|(a_key, a_count), (b_key, b_count)| a_count.cmp(b_count).then_with(|| b_key.cmp(a_key)))
            .unwrap();
        let freq = (winner_count as f64 / total as f64) * 100.0;
        if freq >= thresholds.consensus_threshold && winner_count >= thresholds.count_threshold {
            *counts.entry(winner.clone()).or_insert(0) += 1;
            cons_depth += 1;
            contributing_sizes.push(*family_size);
        }
    }

    let min_fam = contributing_sizes.iter().copied().min().unwrap_or(0);
    let mean_fam = if contributing_sizes.is_empty() {
        0.0
    } else {
        contributing_sizes.iter().sum::<u32>() as f64 / contributing_sizes.len() as f64
    };
    let ref_freq = ref_freq_pct(&counts, ref_base, cons_depth);

    PositionConsensus {
        ref_base,
        counts,
        raw_depth,
        cons_depth,
        min_fam,
        mean_fam,
        ref_freq,
    }
}

/// The uncollapsed (raw) view (4.D): every passing read is tallied
/// directly with no family grouping; family statistics are zero by
/// construction, and raw depth equals consensus depth.
pub fn tally_uncollapsed(ref_base: char, alleles: &[PileupBase]) -> PositionConsensus {
    let mut counts: FxHashMap<(String, String), u32> = FxHashMap::default();
    for allele in alleles {
        *counts.entry((allele.ref_allele.clone(), allele.obs_allele.clone())).or_insert(0) += 1;
    }
    let depth = alleles.len() as u32;
    let ref_freq = ref_freq_pct(&counts, ref_base, depth);
    PositionConsensus {
        ref_base,
        counts,
        raw_depth: depth,
        cons_depth: depth,
        min_fam: 0,
        mean_fam: 0.0,
        ref_freq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snp(base: char) -> PileupBase {
        PileupBase { ref_allele: "A".into(), obs_allele: base.to_string() }
    }

    #[test]
    fn scenario_singleton_umi_no_errors() {
        let observations = vec![FamilyColumnObservation {
            family_key: ("AAAAAA".into(), 1000),
            family_size: 1,
            allele: snp('G'),
        }];
        let thresholds = VoteThresholds { consensus_threshold: 70.0, count_threshold: 1 };
        let consensus = vote_column('A', &observations, &thresholds);
        assert_eq!(consensus.raw_depth, 1);
        assert_eq!(consensus.cons_depth, 1);
        assert_eq!(consensus.ref_freq, 0.0);
        assert_eq!(consensus.mean_fam, 1.0);
    }

    #[test]
    fn scenario_parent_absorbs_one_off_variant() {
        let mut observations: Vec<FamilyColumnObservation> = (0..10)
            .map(|_| FamilyColumnObservation { family_key: ("AAAAAA".into(), 1000), family_size: 11, allele: snp('A') })
            .collect();
        observations.push(FamilyColumnObservation { family_key: ("AAAAAA".into(), 1000), family_size: 11, allele: snp('G') });
        let thresholds = VoteThresholds { consensus_threshold: 70.0, count_threshold: 1 };
        let consensus = vote_column('A', &observations, &thresholds);
        assert_eq!(consensus.raw_depth, 11);
        assert_eq!(consensus.cons_depth, 1);
        assert_eq!(consensus.ref_freq, 100.0);
        assert!(!consensus.counts.contains_key(&("A".to_string(), "G".to_string())));
    }

    #[test]
    fn scenario_positional_split_counts_families_independently() {
        let observations = vec![
            FamilyColumnObservation { family_key: ("CCCCCC".into(), 1000), family_size: 2, allele: snp('A') },
            FamilyColumnObservation { family_key: ("CCCCCC".into(), 1020), family_size: 1, allele: snp('A') },
        ];
        let thresholds = VoteThresholds { consensus_threshold: 70.0, count_threshold: 1 };
        let consensus = vote_column('A', &observations, &thresholds);
        assert_eq!(consensus.cons_depth, 2);
    }

    #[test]
    fn insertion_and_deletion_build_expected_alleles() {
        let ins = pileup_base_full("A", 2, 'A', 'A', "TG");
        assert_eq!(ins.ref_allele, "A");
        assert_eq!(ins.obs_allele, "ATG");

        let del = pileup_base_full("ATCGA", -3, 'A', 'A', "");
        assert_eq!(del.ref_allele, "ATCG");
        assert_eq!(del.obs_allele, "A");
    }

    #[test]
    fn substitution_uses_the_read_own_base_not_the_reference() {
        let snp = pileup_base_full("A", 0, 'A', 'G', "");
        assert_eq!(snp.ref_allele, "A");
        assert_eq!(snp.obs_allele, "G");
    }

    #[test]
    fn uncollapsed_view_has_zero_family_stats() {
        let alleles = vec![snp('A'), snp('A'), snp('G')];
        let consensus = tally_uncollapsed('A', &alleles);
        assert_eq!(consensus.raw_depth, 3);
        assert_eq!(consensus.cons_depth, 3);
        assert_eq!(consensus.min_fam, 0);
        assert_eq!(consensus.mean_fam, 0.0);
    }
}

pub mod family;
pub mod graph;
pub mod index;

pub use family::{closest_family, resolve_families, UmiFamily};
pub use graph::{build_groups, hamming, UmiGroup};
pub use index::{UmiEntry, UmiIndex};

use rustc_hash::FxHashMap;

use crate::pileup::UmiObservation;

/// Top-level component B+C driver: tallies observations, builds the
/// adjacency graph, resolves positional families per group, and assembles
/// the resulting `UmiIndex`.
pub fn build_index(
    contig: &str,
    observations: &[UmiObservation],
    dist_threshold: u32,
    pos_threshold: u32,
    ignore_group_remainders: bool,
) -> UmiIndex {
    build_index_with_details(contig, observations, dist_threshold, pos_threshold, ignore_group_remainders).0
}

/// Like [`build_index`], but also returns the intermediate structures the
/// region driver needs to write the Datafile summary, the UMI relationships
/// side-car, and the pre-grouping histogram (§6): the adjacency groups, the
/// global per-UMI count, and each UMI's own (pre-aggregation) positional
/// histogram.
pub fn build_index_with_details(
    contig: &str,
    observations: &[UmiObservation],
    dist_threshold: u32,
    pos_threshold: u32,
    ignore_group_remainders: bool,
) -> (UmiIndex, Vec<UmiGroup>, FxHashMap<String, u32>, FxHashMap<String, FxHashMap<u32, u32>>) {
    let mut counts: FxHashMap<String, u32> = FxHashMap::default();
    let mut position_histograms: FxHashMap<String, FxHashMap<u32, u32>> = FxHashMap::default();
    for obs in observations {
        *counts.entry(obs.umi.clone()).or_insert(0) += 1;
        *position_histograms
            .entry(obs.umi.clone())
            .or_default()
            .entry(obs.leftmost_pos)
            .or_insert(0) += 1;
    }

    let groups = build_groups(&counts, dist_threshold);

    let mut families_by_parent = FxHashMap::default();
    for group in &groups {
        let mut aggregated: FxHashMap<u32, u32> = FxHashMap::default();
        for umi in group.members() {
            if let Some(hist) = position_histograms.get(umi) {
                for (&pos, &count) in hist {
                    *aggregated.entry(pos).or_insert(0) += count;
                }
            }
        }
        let families = resolve_families(&group.parent, &aggregated, pos_threshold, ignore_group_remainders);
        families_by_parent.insert(group.parent.clone(), families);
    }

    let index = UmiIndex::build(contig, &groups, &families_by_parent);
    (index, groups, counts, position_histograms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(umi: &str, pos: u32) -> UmiObservation {
        UmiObservation {
            umi: umi.to_owned(),
            leftmost_pos: pos,
            read_name: format!("read-{umi}-{pos}"),
        }
    }

    #[test]
    fn build_index_merges_group_histograms_into_shared_families() {
        let observations = vec![
            obs("AAAAAA", 1000),
            obs("AAAAAA", 1000),
            obs("AAAAAT", 1000),
        ];
        let index = build_index("chr1", &observations, 1, 5, false);
        assert_eq!(index.get("AAAAAA").unwrap().parent, "AAAAAA");
        assert_eq!(index.get("AAAAAT").unwrap().parent, "AAAAAA");
        assert_eq!(
            index.get("AAAAAA").unwrap().positions.get("chr1:1000"),
            Some(&3)
        );
    }
}

use rustc_hash::FxHashMap;

/// The unit of collapsing: a parent UMI plus a representative read-start
/// position and the count of reads absorbed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmiFamily {
    pub parent: String,
    pub position: u32,
    pub count: u32,
}

/// Repeatedly extracts the position with the highest remaining count as a
/// family anchor, absorbing every other position within `±pos_threshold`
/// into it, until no positions remain. This is a direct port of the
/// closest-position extraction in the original implementation's consensus
/// generator, generalized from "assign one read to its closest family"
/// into "partition a histogram into families".
///
/// When `ignore_group_remainders` is set, only the single most abundant
/// family is kept and all other positions are discarded.
pub fn resolve_families(
    parent: &str,
    position_counts: &FxHashMap<u32, u32>,
    pos_threshold: u32,
    ignore_group_remainders: bool,
) -> Vec<UmiFamily> {
    let mut remaining: Vec<(u32, u32)> = position_counts.iter().map(|(&p, &c)| (p, c)).collect();
    let mut families = Vec::new();

    while !remaining.is_empty() {
        let (anchor_idx, _) = remaining
            .iter()
            .enumerate()
            .max_by(|(_, (pos_a, count_a)), (_, (pos_b, count_b))| {
                count_a.cmp(count_b).then_with(|| pos_b.cmp(pos_a))
            })
            .unwrap();
        let (anchor_pos, _) = remaining[anchor_idx];

        let mut absorbed_count = 0u32;
        remaining.retain(|&(pos, count)| {
            let delta = pos.abs_diff(anchor_pos);
            if delta <= pos_threshold {
                absorbed_count += count;
                false
            } else {
                true
            }
        });

        families.push(UmiFamily {
            parent: parent.to_owned(),
            position: anchor_pos,
            count: absorbed_count,
        });

        if ignore_group_remainders {
            break;
        }
    }

    families.sort_by_key(|f| f.position);
    families
}

/// Chooses, among a UMI's recorded families, the one whose anchor is
/// closest to `read_start`; ties broken by the highest family count. Used
/// at consensus time (4.D.1c) to assign a single read to one family.
pub fn closest_family<'a>(families: &'a [UmiFamily], read_start: u32) -> Option<&'a UmiFamily> {
    families.iter().min_by(|a, b| {
        let delta_a = a.position.abs_diff(read_start);
        let delta_b = b.position.abs_diff(read_start);
        delta_a.cmp(&delta_b).then_with(|| b.count.cmp(&a.count))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(pairs: &[(u32, u32)]) -> FxHashMap<u32, u32> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn position_delta_exactly_p_joins_family() {
        let h = hist(&[(1000, 10), (1005, 1)]);
        let families = resolve_families("AAAAAA", &h, 5, false);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].position, 1000);
        assert_eq!(families[0].count, 11);
    }

    #[test]
    fn position_delta_one_past_p_splits_family() {
        let h = hist(&[(1000, 10), (1006, 1)]);
        let families = resolve_families("AAAAAA", &h, 5, false);
        assert_eq!(families.len(), 2);
    }

    #[test]
    fn tie_break_prefers_smaller_position() {
        let h = hist(&[(2000, 5), (1000, 5)]);
        let families = resolve_families("AAAAAA", &h, 0, false);
        assert_eq!(families[0].position, 1000);
        assert_eq!(families[0].count, 5);
        assert_eq!(families[1].position, 2000);
    }

    #[test]
    fn ignore_group_remainders_keeps_only_most_abundant() {
        let h = hist(&[(1000, 10), (2000, 1)]);
        let families = resolve_families("AAAAAA", &h, 0, true);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].position, 1000);
    }

    #[test]
    fn closest_family_breaks_ties_by_highest_count() {
        let families = vec![
            UmiFamily { parent: "A".into(), position: 990, count: 3 },
            UmiFamily { parent: "A".into(), position: 1010, count: 8 },
        ];
        let picked = closest_family(&families, 1000).unwrap();
        assert_eq!(picked.count, 8);
    }
}

use rustc_hash::{FxHashMap, FxHashSet};

/// One connected component of the UMI adjacency graph: a parent UMI plus
/// every other UMI string reachable from it through a chain of
/// Hamming-distance-≤-D edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmiGroup {
    pub parent: String,
    pub children: Vec<String>,
}

impl UmiGroup {
    pub fn members(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.parent.as_str()).chain(self.children.iter().map(String::as_str))
    }
}

pub(crate) fn hamming(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() as u32
}

/// Splits every observed UMI into `threshold + 1` contiguous blocks and
/// buckets by `(block_index, block_bytes)`. Any two strings within Hamming
/// distance `threshold` of one another must agree exactly on at least one
/// block (pigeonhole), so candidate edges can be restricted to UMI pairs
/// that share a bucket — this is the prefix/suffix bucketing trick called
/// for when UMI counts are large (§9).
fn candidate_pairs<'a>(umis: &'a [String], threshold: u32) -> FxHashSet<(usize, usize)> {
    let num_blocks = (threshold + 1).max(1) as usize;
    let mut buckets: FxHashMap<(usize, &'a [u8]), Vec<usize>> = FxHashMap::default();

    for (idx, umi) in umis.iter().enumerate() {
        let bytes = umi.as_bytes();
        let len = bytes.len();
        let block_len = (len / num_blocks).max(1);
        for block in 0..num_blocks {
            let start = block * block_len;
            if start >= len {
                break;
            }
            let end = if block == num_blocks - 1 { len } else { (start + block_len).min(len) };
            buckets.entry((block, &bytes[start..end])).or_default().push(idx);
        }
    }

    let mut pairs = FxHashSet::default();
    for members in buckets.values() {
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let (a, b) = (members[i], members[j]);
                pairs.insert(if a < b { (a, b) } else { (b, a) });
            }
        }
    }
    pairs
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Builds the UMI adjacency graph (component B) from per-UMI total counts
/// and partitions it into connected components, electing a parent per
/// component: the member with the highest global count, ties broken by
/// the lexicographically smallest UMI string.
pub fn build_groups(counts: &FxHashMap<String, u32>, dist_threshold: u32) -> Vec<UmiGroup> {
    let umis: Vec<String> = counts.keys().cloned().collect();
    if umis.is_empty() {
        return Vec::new();
    }

    let mut uf = UnionFind::new(umis.len());
    for (a, b) in candidate_pairs(&umis, dist_threshold) {
        if hamming(umis[a].as_bytes(), umis[b].as_bytes()) <= dist_threshold {
            uf.union(a, b);
        }
    }

    let mut components: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for idx in 0..umis.len() {
        let root = uf.find(idx);
        components.entry(root).or_default().push(idx);
    }

    let mut groups: Vec<UmiGroup> = components
        .into_values()
        .map(|members| {
            let parent_idx = *members
                .iter()
                .max_by(|&&a, &&b| {
                    let count_a = counts[&umis[a]];
                    let count_b = counts[&umis[b]];
                    count_a.cmp(&count_b).then_with(|| umis[b].cmp(&umis[a]))
                })
                .unwrap();
            let parent = umis[parent_idx].clone();
            let children = members
                .into_iter()
                .filter(|&idx| idx != parent_idx)
                .map(|idx| umis[idx].clone())
                .collect();
            UmiGroup { parent, children }
        })
        .collect();

    groups.sort_by(|a, b| a.parent.cmp(&b.parent));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u32)]) -> FxHashMap<String, u32> {
        pairs.iter().map(|(umi, c)| (umi.to_string(), *c)).collect()
    }

    #[test]
    fn hamming_distance_exactly_threshold_joins_group() {
        let c = counts(&[("AAAAAA", 10), ("AAAAAT", 1)]);
        let groups = build_groups(&c, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].parent, "AAAAAA");
        assert_eq!(groups[0].children, vec!["AAAAAT".to_string()]);
    }

    #[test]
    fn hamming_distance_one_past_threshold_stays_separate() {
        let c = counts(&[("AAAAAA", 10), ("AATAAT", 1)]);
        let groups = build_groups(&c, 1);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn parent_is_highest_count_tie_broken_lexicographically() {
        let c = counts(&[("AAAAAA", 5), ("AAAAAT", 5)]);
        let groups = build_groups(&c, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].parent, "AAAAAA");
    }

    #[test]
    fn singleton_umi_forms_its_own_group() {
        let c = counts(&[("GGGGGG", 3)]);
        let groups = build_groups(&c, 2);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].children.is_empty());
    }

    #[test]
    fn chain_of_edges_merges_into_one_component() {
        // A -1-> B -1-> C where A/C are distance 2 apart (not directly linked)
        // but still belong to the same connected component through B.
        let c = counts(&[("AAAAAA", 20), ("AAAAAT", 5), ("AAAATT", 1)]);
        let groups = build_groups(&c, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].parent, "AAAAAA");
        assert_eq!(groups[0].children.len(), 2);
    }
}

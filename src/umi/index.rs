use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errs::DebarcerError;
use crate::umi::family::{closest_family, UmiFamily};
use crate::umi::graph::UmiGroup;

/// One observed UMI's entry in the index: its group parent, and the
/// families (anchor position → absorbed count) it participates in. A
/// `BTreeMap` keeps key order deterministic so serialized JSON is
/// byte-identical across runs given identical inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UmiEntry {
    pub parent: String,
    pub positions: BTreeMap<String, u32>,
}

/// A region's UMI index: built once by components B+C, persisted to disk,
/// and read-only for the consensus engine (component D).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UmiIndex {
    #[serde(flatten)]
    entries: BTreeMap<String, UmiEntry>,
}

impl UmiIndex {
    /// Builds the index from the adjacency groups (component B) and the
    /// per-parent family list (component C). Every member of a group
    /// shares that group's family list, keyed under its own UMI string.
    pub fn build(contig: &str, groups: &[UmiGroup], families_by_parent: &FxHashMap<String, Vec<UmiFamily>>) -> Self {
        let mut entries = BTreeMap::new();
        for group in groups {
            let families = families_by_parent.get(&group.parent).cloned().unwrap_or_default();
            let positions: BTreeMap<String, u32> = families
                .iter()
                .map(|f| (format!("{contig}:{}", f.position), f.count))
                .collect();
            for umi in group.members() {
                entries.insert(
                    umi.to_owned(),
                    UmiEntry {
                        parent: group.parent.clone(),
                        positions: positions.clone(),
                    },
                );
            }
        }
        Self { entries }
    }

    pub fn get(&self, umi: &str) -> Option<&UmiEntry> {
        self.entries.get(umi)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UmiEntry)> {
        self.entries.iter()
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), DebarcerError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| DebarcerError::logic(format!("failed to serialize UmiIndex: {e}")))
    }

    pub fn read_from_file(path: &Path) -> Result<Self, DebarcerError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DebarcerError::corrupt(format!("malformed UmiIndex JSON at {}: {e}", path.display())))
    }

    /// Given a read's UMI tag and leftmost reference position, resolves
    /// the family it belongs to (4.D.1c): the closest anchor within
    /// `pos_threshold`, breaking ties by highest count. Returns `None`
    /// when the UMI is unknown or no family anchor falls within threshold.
    pub fn resolve_read_family(
        &self,
        umi: &str,
        contig: &str,
        read_start: u32,
        pos_threshold: u32,
    ) -> Option<(String, UmiFamily)> {
        let entry = self.get(umi)?;
        let prefix = format!("{contig}:");
        let families: Vec<UmiFamily> = entry
            .positions
            .iter()
            .filter_map(|(key, &count)| {
                let pos_str = key.strip_prefix(&prefix)?;
                let position: u32 = pos_str.parse().ok()?;
                Some(UmiFamily {
                    parent: entry.parent.clone(),
                    position,
                    count,
                })
            })
            .collect();
        let chosen = closest_family(&families, read_start)?;
        if chosen.position.abs_diff(read_start) > pos_threshold {
            return None;
        }
        Some((entry.parent.clone(), chosen.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_json() {
        let mut families = FxHashMap::default();
        families.insert(
            "AAAAAA".to_string(),
            vec![UmiFamily { parent: "AAAAAA".into(), position: 1000, count: 11 }],
        );
        let groups = vec![UmiGroup { parent: "AAAAAA".into(), children: vec!["AAAAAT".into()] }];
        let index = UmiIndex::build("chr1", &groups, &families);

        let serialized = serde_json::to_string(&index).unwrap();
        let deserialized: UmiIndex = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.get("AAAAAT").unwrap().parent, "AAAAAA");
    }

    #[test]
    fn resolve_read_family_respects_position_threshold() {
        let mut families = FxHashMap::default();
        families.insert(
            "AAAAAA".to_string(),
            vec![UmiFamily { parent: "AAAAAA".into(), position: 1000, count: 11 }],
        );
        let groups = vec![UmiGroup { parent: "AAAAAA".into(), children: vec![] }];
        let index = UmiIndex::build("chr1", &groups, &families);

        assert!(index.resolve_read_family("AAAAAA", "chr1", 1003, 5).is_some());
        assert!(index.resolve_read_family("AAAAAA", "chr1", 1010, 5).is_none());
        assert!(index.resolve_read_family("UNKNOWN", "chr1", 1000, 5).is_none());
    }
}

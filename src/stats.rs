use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errs::DebarcerError;

/// `Stats/CoverageStats.yml`: mean pileup depth per region, appended to
/// across every region a run processes. The spec calls for either a
/// concurrency-safe append or per-region fragments merged afterwards; this
/// crate takes the simpler of the two safe options and shares one
/// `Mutex`-guarded map across the rayon worker pool, serializing once at
/// the end of the run rather than racing file-level appends.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CoverageStats {
    #[serde(flatten)]
    entries: BTreeMap<String, f64>,
}

impl CoverageStats {
    pub fn load_or_default(path: &Path) -> Result<Self, DebarcerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path)?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|e| DebarcerError::corrupt(format!("malformed coverage stats at {}: {e}", path.display())))
    }

    pub fn record(&mut self, region_key: impl Into<String>, mean_depth: f64) {
        self.entries.insert(region_key.into(), round2(mean_depth));
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), DebarcerError> {
        let file = File::create(path)?;
        serde_yaml::to_writer(BufWriter::new(file), self).map_err(|e| DebarcerError::logic(format!("failed to serialize coverage stats: {e}")))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Shared handle for concurrent region workers to record their region's
/// mean coverage without racing each other on the underlying map.
#[derive(Default)]
pub struct SharedCoverageStats(Mutex<CoverageStats>);

impl SharedCoverageStats {
    pub fn new(initial: CoverageStats) -> Self {
        Self(Mutex::new(initial))
    }

    pub fn record(&self, region_key: impl Into<String>, mean_depth: f64) {
        self.0.lock().unwrap().record(region_key, mean_depth);
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), DebarcerError> {
        self.0.lock().unwrap().write_to_file(path)
    }
}

/// `Stats/Mapped_read_counts_{region}.json`: mapped vs. unmapped read
/// tallies observed while scanning a region's reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappedReadCounts {
    pub mapped: u64,
    pub unmapped: u64,
}

impl MappedReadCounts {
    pub fn write_to_file(&self, path: &Path) -> Result<(), DebarcerError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|e| DebarcerError::logic(format!("failed to serialize read counts: {e}")))
    }
}

/// `Stats/Umis_{region}_before_grouping.json`: the raw per-UMI positional
/// histogram observed before adjacency grouping collapses it, kept as a
/// diagnostic snapshot of component B's input.
pub fn write_pre_grouping_histogram(path: &Path, histogram: &FxHashMap<String, FxHashMap<u32, u32>>) -> Result<(), DebarcerError> {
    let ordered: BTreeMap<&String, BTreeMap<u32, u32>> = histogram.iter().map(|(umi, hist)| (umi, hist.iter().map(|(&p, &c)| (p, c)).collect())).collect();
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &ordered).map_err(|e| DebarcerError::logic(format!("failed to serialize pre-grouping histogram: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_round_trips_and_rounds_to_two_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CoverageStats.yml");
        let mut stats = CoverageStats::default();
        stats.record("chr1:1000-2000", 123.456);
        stats.write_to_file(&path).unwrap();

        let loaded = CoverageStats::load_or_default(&path).unwrap();
        assert_eq!(loaded.entries.get("chr1:1000-2000"), Some(&123.46));
    }

    #[test]
    fn shared_coverage_stats_is_usable_from_multiple_threads() {
        let shared = SharedCoverageStats::default();
        std::thread::scope(|scope| {
            for i in 0..4 {
                let shared = &shared;
                scope.spawn(move || {
                    shared.record(format!("chr1:{i}"), i as f64);
                });
            }
        });
        assert_eq!(shared.0.lock().unwrap().entries.len(), 4);
    }
}

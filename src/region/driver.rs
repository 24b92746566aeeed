use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{info, warn};
use log_once::warn_once;

use crate::consensus::{compute_region_consensus, CollapseConfig, ConsensusRow, ConsensusTableWriter};
use crate::datafile::{median_position, DatafileRow, DatafileWriter, GroupQcRow, GroupQcWriter};
use crate::errs::DebarcerError;
use crate::pileup::{PileupColumn, UmiObservation};
use crate::reference::ReferenceFasta;
use crate::stats::{write_pre_grouping_histogram, MappedReadCounts, SharedCoverageStats};
use crate::umi::{build_index_with_details, hamming, UmiIndex};
use crate::util::Region;
use crate::variant::{emit_variants, read_consensus_table, VariantRecord, VariantThresholds, VcfWriter};
use crate::writers::OutWriter;

/// The on-disk directory layout under a run's output root (§6): one
/// subdirectory per artifact kind, one file per region within each.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure_dirs(&self) -> Result<(), DebarcerError> {
        for dir in ["Umifiles", "Datafiles", "Consfiles", "VCFfiles", "Stats"] {
            fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn umi_index_path(&self, region: &Region) -> PathBuf {
        self.root.join("Umifiles").join(format!("{}.json", region.to_wire_string()))
    }

    pub fn datafile_path(&self, region: &Region) -> PathBuf {
        self.root.join("Datafiles").join(format!("datafile_{}.csv", region.to_wire_string()))
    }

    pub fn consensus_path(&self, region: &Region) -> PathBuf {
        self.root.join("Consfiles").join(format!("{}.cons", region.to_wire_string()))
    }

    pub fn vcf_path(&self, region: &Region, family_size: u32) -> PathBuf {
        self.root
            .join("VCFfiles")
            .join(format!("{}_umifam_{}.vcf", region.to_wire_string(), family_size))
    }

    pub fn coverage_stats_path(&self) -> PathBuf {
        self.root.join("Stats").join("CoverageStats.yml")
    }

    pub fn umi_relationships_path(&self, region: &Region) -> PathBuf {
        self.root.join("Stats").join(format!("UMI_relationships_{}.txt", region.to_wire_string()))
    }

    pub fn pre_grouping_histogram_path(&self, region: &Region) -> PathBuf {
        self.root.join("Stats").join(format!("Umis_{}_before_grouping.json", region.to_wire_string()))
    }

    pub fn mapped_counts_path(&self, region: &Region) -> PathBuf {
        self.root.join("Stats").join(format!("Mapped_read_counts_{}.json", region.to_wire_string()))
    }
}

/// Thresholds component B+C run under for one region.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub dist_threshold: u32,
    pub pos_threshold: u32,
    pub ignore_group_remainders: bool,
}

/// Summary of one region's pass through components A–F.
#[derive(Debug, Clone)]
pub struct RegionRunOutcome {
    pub region: Region,
    pub consensus_rows: usize,
    pub variant_records: usize,
}

/// Component G: coordinates A–F for a single `(contig, start, end)` region
/// and drives its on-disk artifacts (§6). Each method corresponds to one
/// stage of the pipeline and takes its BAM-facing data as an already-
/// fetched value or an injectable closure, so the orchestration itself is
/// testable without a real BAM/FASTA pair.
pub struct RegionDriver<'a> {
    layout: &'a OutputLayout,
}

impl<'a> RegionDriver<'a> {
    pub fn new(layout: &'a OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        self.layout
    }

    /// Component B+C: reuses a previously persisted `UmiIndex` for this
    /// region if present, otherwise builds one from `observations` and
    /// writes every side-artifact grouping produces (Datafile, UMI
    /// relationships, pre-grouping histogram, mapped read counts).
    pub fn group(
        &self,
        region: &Region,
        observations: &[UmiObservation],
        mapped_counts: &MappedReadCounts,
        config: &GroupConfig,
    ) -> Result<UmiIndex, DebarcerError> {
        let index_path = self.layout.umi_index_path(region);
        if index_path.exists() {
            info!("reusing cached UmiIndex for {}", region.to_wire_string());
            return UmiIndex::read_from_file(&index_path);
        }

        if observations.is_empty() {
            warn_once!("{}: no UMI observations in region, writing an empty UmiIndex", region.to_wire_string());
        }

        let (index, groups, counts, histograms) =
            build_index_with_details(&region.name, observations, config.dist_threshold, config.pos_threshold, config.ignore_group_remainders);
        index.write_to_file(&index_path)?;
        self.write_group_artifacts(region, &groups, &counts, &histograms, mapped_counts)?;
        Ok(index)
    }

    fn write_group_artifacts(
        &self,
        region: &Region,
        groups: &[crate::umi::UmiGroup],
        counts: &rustc_hash::FxHashMap<String, u32>,
        histograms: &rustc_hash::FxHashMap<String, rustc_hash::FxHashMap<u32, u32>>,
        mapped_counts: &MappedReadCounts,
    ) -> Result<(), DebarcerError> {
        let datafile_row = DatafileRow::from_groups(region.clone(), groups, counts);
        let mut datafile_writer = DatafileWriter::new(BufWriter::new(File::create(self.layout.datafile_path(region))?));
        OutWriter::<&DatafileRow>::write(&mut datafile_writer, &datafile_row).map_err(|e| DebarcerError::io(e.to_string()))?;

        let mut qc_writer = GroupQcWriter::new(BufWriter::new(File::create(self.layout.umi_relationships_path(region))?));
        for group in groups {
            for umi in group.members() {
                let count = counts.get(umi).copied().unwrap_or(0);
                let distance = hamming(group.parent.as_bytes(), umi.as_bytes());
                let positions: Vec<u32> = histograms
                    .get(umi)
                    .map(|hist| hist.iter().flat_map(|(&pos, &c)| std::iter::repeat(pos).take(c as usize)).collect())
                    .unwrap_or_default();
                let row = GroupQcRow {
                    umi: umi.to_owned(),
                    count,
                    parent: group.parent.clone(),
                    distance,
                    median_position: median_position(&positions),
                };
                OutWriter::<&GroupQcRow>::write(&mut qc_writer, &row).map_err(|e| DebarcerError::io(e.to_string()))?;
            }
        }

        write_pre_grouping_histogram(&self.layout.pre_grouping_histogram_path(region), histograms)?;
        mapped_counts.write_to_file(&self.layout.mapped_counts_path(region))?;
        Ok(())
    }

    /// Component D+E: walks the region's pileup columns, writes the
    /// consensus table, and records the region's mean raw-depth coverage
    /// into the shared side-car.
    pub fn collapse(
        &self,
        region: &Region,
        columns_source: impl Fn() -> Result<Vec<PileupColumn>, DebarcerError>,
        reference: &ReferenceFasta,
        index: &UmiIndex,
        config: &CollapseConfig,
        coverage: &SharedCoverageStats,
    ) -> Result<Vec<ConsensusRow>, DebarcerError> {
        let rows = compute_region_consensus(&region.name, columns_source, reference, index, config)?;
        if rows.is_empty() {
            warn!("{}: empty pileup, no consensus rows written", region.to_wire_string());
        } else {
            let uncollapsed_depths: Vec<u32> = rows.iter().filter(|r| r.family_size == 0).map(|r| r.raw_depth).collect();
            let mean_depth = if uncollapsed_depths.is_empty() {
                0.0
            } else {
                uncollapsed_depths.iter().copied().sum::<u32>() as f64 / uncollapsed_depths.len() as f64
            };
            coverage.record(region.to_wire_string(), mean_depth);
        }

        let mut writer = ConsensusTableWriter::new(BufWriter::new(File::create(self.layout.consensus_path(region))?));
        OutWriter::<&[ConsensusRow]>::write(&mut writer, &rows).map_err(|e| DebarcerError::io(e.to_string()))?;
        Ok(rows)
    }

    /// Component F: reads this region's consensus table back from disk and
    /// emits one VCF file per family-size threshold.
    pub fn call(
        &self,
        region: &Region,
        family_sizes: &[u32],
        thresholds: &VariantThresholds,
        reference_path: &str,
        file_date: &str,
    ) -> Result<usize, DebarcerError> {
        let table_rows = read_consensus_table(&self.layout.consensus_path(region))?;
        if table_rows.is_empty() {
            warn_once!("{}: empty consensus table, skipping variant emission", region.to_wire_string());
            return Ok(0);
        }

        let records = emit_variants(&table_rows, thresholds);
        let mut total = 0usize;
        for &f in family_sizes {
            let subset: Vec<&VariantRecord> = records.iter().filter(|r| r.family_size == f).collect();
            let file = File::create(self.layout.vcf_path(region, f))?;
            let mut writer = VcfWriter::new(BufWriter::new(file), reference_path, file_date, f, thresholds.filter_threshold)
                .map_err(|e| DebarcerError::io(e.to_string()))?;
            for record in &subset {
                OutWriter::<(&VariantRecord, u32)>::write(&mut writer, (record, thresholds.filter_threshold))
                    .map_err(|e| DebarcerError::io(e.to_string()))?;
            }
            total += subset.len();
        }
        Ok(total)
    }

    /// The full component-G pass for one region: B+C, then D+E, then
    /// optionally F. Per §5/§7, a caller driving many regions in parallel
    /// catches the `Result` here, logs, and moves on to the next region
    /// rather than letting one region's failure abort the run.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        region: &Region,
        observations_source: impl Fn() -> Result<(Vec<UmiObservation>, MappedReadCounts), DebarcerError>,
        columns_source: impl Fn() -> Result<Vec<PileupColumn>, DebarcerError>,
        reference: &ReferenceFasta,
        coverage: &SharedCoverageStats,
        group_config: &GroupConfig,
        collapse_config: &CollapseConfig,
        variant: Option<(&VariantThresholds, &str, &str)>,
    ) -> Result<RegionRunOutcome, DebarcerError> {
        self.layout.ensure_dirs()?;
        let (observations, mapped_counts) = observations_source()?;
        let index = self.group(region, &observations, &mapped_counts, group_config)?;
        let rows = self.collapse(region, columns_source, reference, &index, collapse_config, coverage)?;
        let variant_records = match variant {
            Some((thresholds, reference_path, file_date)) => self.call(region, &collapse_config.family_sizes, thresholds, reference_path, file_date)?,
            None => 0,
        };
        Ok(RegionRunOutcome { region: region.clone(), consensus_rows: rows.len(), variant_records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_use_wire_format_region_strings() {
        let layout = OutputLayout::new("/tmp/out");
        let region = Region { name: "chr1".into(), start: 999, end: 2000 };
        assert_eq!(layout.umi_index_path(&region), Path::new("/tmp/out/Umifiles/chr1:1000-2000.json"));
        assert_eq!(layout.consensus_path(&region), Path::new("/tmp/out/Consfiles/chr1:1000-2000.cons"));
        assert_eq!(layout.vcf_path(&region, 3), Path::new("/tmp/out/VCFfiles/chr1:1000-2000_umifam_3.vcf"));
        assert_eq!(layout.datafile_path(&region), Path::new("/tmp/out/Datafiles/datafile_chr1:1000-2000.csv"));
    }
}

use std::path::Path;

use log::debug;
use rust_htslib::bam::{self, Read as BamRead};

use crate::errs::DebarcerError;
use crate::stats::MappedReadCounts;
use crate::util::{get_query_name_string, record_is_secondary, umis_from_read_name, Region};

/// How aggressively the adapter filters reads before they reach a pileup
/// column, mirroring pysam's `stepper` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stepper {
    /// Skip UNMAP | SECONDARY | QCFAIL | DUP, the pysam default.
    All,
    /// Include every read regardless of flags.
    NoFilter,
}

#[derive(Debug, Clone)]
pub struct PileupOptions {
    pub max_depth: u32,
    pub truncate: bool,
    pub ignore_orphans: bool,
    pub stepper: Stepper,
}

impl Default for PileupOptions {
    fn default() -> Self {
        Self {
            max_depth: 8_000,
            truncate: true,
            ignore_orphans: false,
            stepper: Stepper::All,
        }
    }
}

/// One read's contribution at a single pileup column.
#[derive(Debug, Clone)]
pub struct PileupReadInfo {
    pub read_name: String,
    pub umis: Vec<String>,
    pub leftmost_pos: u32,
    pub is_del: bool,
    pub is_refskip: bool,
    /// Length of the indel at the position following this column: 0, >0 for
    /// an insertion, <0 for a deletion.
    pub indel: i32,
    pub query_position: Option<usize>,
    pub query_base: Option<u8>,
    /// The bases inserted after this column, present only when `indel > 0`.
    pub inserted_bases: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PileupColumn {
    pub reference_pos: u32,
    pub reads: Vec<PileupReadInfo>,
}

/// A single occurrence of a UMI in aligned data, produced while scanning a
/// region's reads for component B.
#[derive(Debug, Clone)]
pub struct UmiObservation {
    pub umi: String,
    pub leftmost_pos: u32,
    pub read_name: String,
}

fn umis_from_record(record: &bam::Record) -> Result<Vec<String>, DebarcerError> {
    let read_name = get_query_name_string(record)?;
    Ok(umis_from_read_name(&read_name).into_iter().map(str::to_owned).collect())
}

/// The result of a single pass over a region's reads (component A.1): the
/// filtered UMI observations plus the mapped/unmapped tally (§6
/// `Stats/Mapped_read_counts_{region}.json`) collected along the way, so a
/// region only needs to be scanned once.
#[derive(Debug, Clone, Default)]
pub struct ReadScan {
    pub observations: Vec<UmiObservation>,
    pub counts: MappedReadCounts,
}

/// Scans the aligned reads overlapping a region (4.A.1), filtering out
/// unmapped, secondary, and supplementary alignments and recovering the
/// UMI tag(s) from the read-name suffix, while tallying mapped vs.
/// unmapped reads seen along the way.
pub fn scan_reads(bam_path: &Path, region: &Region) -> Result<ReadScan, DebarcerError> {
    let mut reader = bam::IndexedReader::from_path(bam_path)
        .map_err(|e| DebarcerError::input(format!("failed to open BAM {}: {e}", bam_path.display())))?;
    let fetch_def = region.get_fetch_definition(reader.header())?;
    reader
        .fetch(fetch_def)
        .map_err(|e| DebarcerError::input(format!("failed to fetch region {}: {e}", region.to_wire_string())))?;

    let mut scan = ReadScan::default();
    for result in reader.records() {
        let record = result.map_err(|e| DebarcerError::io(e.to_string()))?;
        if record.is_unmapped() {
            scan.counts.unmapped += 1;
            continue;
        }
        scan.counts.mapped += 1;
        if record_is_secondary(&record) {
            continue;
        }
        let leftmost_pos = record.pos().max(0) as u32;
        for umi in umis_from_record(&record)? {
            scan.observations.push(UmiObservation {
                umi,
                leftmost_pos,
                read_name: get_query_name_string(&record)?,
            });
        }
    }
    Ok(scan)
}

/// Iterates the aligned reads overlapping a region (4.A.1); a convenience
/// wrapper over [`scan_reads`] for callers that don't need the mapped/
/// unmapped tally.
pub fn umi_observations(bam_path: &Path, region: &Region) -> Result<Vec<UmiObservation>, DebarcerError> {
    scan_reads(bam_path, region).map(|scan| scan.observations)
}

/// Restricts a raw `rust_htslib` pileup stream to the half-open `[start,
/// end)` window of the fetched region, mirroring the teacher's `PileupIter`.
struct WindowedPileup<'a> {
    pileups: bam::pileup::Pileups<'a, bam::IndexedReader>,
    start_pos: u32,
    end_pos: u32,
    truncate: bool,
}

impl<'a> Iterator for WindowedPileup<'a> {
    type Item = bam::pileup::Pileup;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let plp = match self.pileups.next()? {
                Ok(plp) => plp,
                Err(_) => continue,
            };
            if self.truncate {
                if plp.pos() >= self.end_pos {
                    return None;
                }
                if plp.pos() < self.start_pos {
                    continue;
                }
            }
            return Some(plp);
        }
    }
}

fn indel_len(alignment: &bam::pileup::Alignment) -> i32 {
    match alignment.indel() {
        bam::pileup::Indel::Ins(len) => len as i32,
        bam::pileup::Indel::Del(len) => -(len as i32),
        bam::pileup::Indel::None => 0,
    }
}

fn passes_stepper(record: &bam::Record, stepper: Stepper) -> bool {
    match stepper {
        Stepper::NoFilter => true,
        Stepper::All => {
            !(record.is_unmapped() || record.is_secondary() || record.is_quality_check_failed() || record.is_duplicate())
        }
    }
}

fn passes_orphan_filter(record: &bam::Record, ignore_orphans: bool) -> bool {
    if !ignore_orphans {
        return true;
    }
    !record.is_paired() || record.is_proper_pair()
}

/// Walks pileup columns over `[region.start, region.end)` (4.A.2).
pub fn pileup_columns(
    bam_path: &Path,
    region: &Region,
    options: &PileupOptions,
) -> Result<Vec<PileupColumn>, DebarcerError> {
    let mut reader = bam::IndexedReader::from_path(bam_path)
        .map_err(|e| DebarcerError::input(format!("failed to open BAM {}: {e}", bam_path.display())))?;
    let fetch_def = region.get_fetch_definition(reader.header())?;
    reader
        .fetch(fetch_def)
        .map_err(|e| DebarcerError::input(format!("failed to fetch region {}: {e}", region.to_wire_string())))?;

    let mut pileups = reader.pileup();
    pileups.set_max_depth(options.max_depth);

    let windowed = WindowedPileup {
        pileups,
        start_pos: region.start,
        end_pos: region.end,
        truncate: options.truncate,
    };

    let mut columns = Vec::new();
    for pileup in windowed {
        let reference_pos = pileup.pos();
        let mut reads = Vec::new();
        for alignment in pileup.alignments() {
            let record = alignment.record();
            if !passes_stepper(&record, options.stepper) {
                continue;
            }
            if !passes_orphan_filter(&record, options.ignore_orphans) {
                continue;
            }
            let read_name = match get_query_name_string(&record) {
                Ok(name) => name,
                Err(e) => {
                    debug!("skipping read with invalid name at {reference_pos}: {e}");
                    continue;
                }
            };
            let umis = umis_from_read_name(&read_name).into_iter().map(str::to_owned).collect();
            let leftmost_pos = record.pos().max(0) as u32;
            let query_position = alignment.qpos();
            let query_seq = record.seq();
            let query_base = query_position.and_then(|pos| query_seq.as_bytes().get(pos).copied());
            let indel = indel_len(&alignment);
            let inserted_bases = if indel > 0 {
                query_position.and_then(|pos| {
                    let bytes = query_seq.as_bytes();
                    let end = pos + 1 + indel as usize;
                    bytes.get(pos + 1..end.min(bytes.len())).map(|s| String::from_utf8_lossy(s).into_owned())
                })
            } else {
                None
            };

            reads.push(PileupReadInfo {
                read_name,
                umis,
                leftmost_pos,
                is_del: alignment.is_del(),
                is_refskip: alignment.is_refskip(),
                indel,
                query_position,
                query_base,
                inserted_bases,
            });
        }
        columns.push(PileupColumn { reference_pos, reads });
    }
    Ok(columns)
}

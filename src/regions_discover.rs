use std::path::Path;

use crate::errs::DebarcerError;
use crate::pileup::reader::{pileup_columns, PileupOptions};
use crate::util::Region;

/// Supplemented feature (not in the distilled core, present in the
/// original implementation): discovers candidate target regions by
/// walking a contig's pileup and keeping maximal sub-intervals where
/// depth stays at or above `min_cov`, filtered to those at least
/// `region_size` long.
pub fn find_regions_coverage(
    bam_path: &Path,
    contig: &str,
    contig_length: u32,
    min_cov: u32,
    region_size: u32,
    pileup_options: &PileupOptions,
) -> Result<Vec<Region>, DebarcerError> {
    let whole_contig = Region { name: contig.to_owned(), start: 0, end: contig_length };
    let columns = pileup_columns(bam_path, &whole_contig, pileup_options)?;

    let mut regions = Vec::new();
    let mut current_start: Option<u32> = None;
    let mut last_pos: Option<u32> = None;

    let mut close_interval = |start: u32, end: u32, regions: &mut Vec<Region>| {
        if end - start >= region_size {
            regions.push(Region { name: contig.to_owned(), start, end });
        }
    };

    for column in &columns {
        let covered = column.reads.len() as u32 >= min_cov;
        let contiguous = last_pos.map(|p| column.reference_pos == p + 1).unwrap_or(false);

        if covered {
            if current_start.is_none() {
                current_start = Some(column.reference_pos);
            } else if !contiguous {
                close_interval(current_start.unwrap(), last_pos.unwrap() + 1, &mut regions);
                current_start = Some(column.reference_pos);
            }
            last_pos = Some(column.reference_pos);
        } else {
            if let Some(start) = current_start.take() {
                close_interval(start, last_pos.unwrap() + 1, &mut regions);
            }
            last_pos = None;
        }
    }
    if let Some(start) = current_start {
        close_interval(start, last_pos.unwrap() + 1, &mut regions);
    }

    Ok(regions)
}

/// Writes discovered regions as a 0-based, half-open BED file, one row per
/// region, matching the convention `read_bed_regions` parses back.
pub fn write_targets_bed(path: &Path, regions: &[Region]) -> Result<(), DebarcerError> {
    use std::io::Write;
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for region in regions {
        writeln!(file, "{}\t{}\t{}", region.name, region.start, region.end).map_err(|e| DebarcerError::io(e.to_string()))?;
    }
    Ok(())
}

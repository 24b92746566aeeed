use std::path::Path;

use serde::Deserialize;

use crate::errs::DebarcerError;
use crate::util::Region;

/// A single BED interval: 0-based, half-open, exactly as the format
/// specifies. Extra BED columns (name, score, strand, ...) are accepted
/// but ignored.
#[derive(Debug, Clone, Deserialize)]
struct BedRecord {
    chrom: String,
    start: u32,
    end: u32,
}

/// Reads a BED file into `Region`s. Tab-delimited, no header, following
/// the same `csv`-crate idiom used for other tabular formats in this crate.
pub fn read_bed_regions(path: &Path) -> Result<Vec<Region>, DebarcerError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DebarcerError::input(format!("failed to open BED file {}: {e}", path.display())))?;

    let mut regions = Vec::new();
    for result in reader.deserialize() {
        let record: BedRecord = result.map_err(|e| DebarcerError::corrupt(format!("malformed BED row in {}: {e}", path.display())))?;
        if record.end <= record.start {
            return Err(DebarcerError::input(format!(
                "BED interval {}:{}-{} has end <= start",
                record.chrom, record.start, record.end
            )));
        }
        regions.push(Region {
            name: record.chrom,
            start: record.start,
            end: record.end,
        });
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_tab_delimited_bed_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chr1\t999\t2000").unwrap();
        writeln!(file, "chr2\t0\t500\tname\t0\t+").unwrap();
        let regions = read_bed_regions(file.path()).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "chr1");
        assert_eq!(regions[0].start, 999);
        assert_eq!(regions[0].end, 2000);
        assert_eq!(regions[1].name, "chr2");
    }

    #[test]
    fn rejects_inverted_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chr1\t2000\t1000").unwrap();
        assert!(read_bed_regions(file.path()).is_err());
    }
}

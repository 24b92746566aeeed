use derive_new::new;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use rust_htslib::bam::{self, HeaderView};

use crate::errs::DebarcerError;

pub fn get_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] {pos} {msg}")
            .unwrap()
            .tick_strings(&[
                "▹▹▹▹▹",
                "▸▹▹▹▹",
                "▹▸▹▹▹",
                "▹▹▸▹▹",
                "▹▹▹▸▹",
                "▹▹▹▹▸",
                "▪▪▪▪▪",
            ]),
    );
    spinner
}

fn get_master_progress_bar_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.green/yellow} {pos:>7}/{len:7} {msg}")
        .unwrap()
        .progress_chars("##-")
}

pub fn get_master_progress_bar(n: usize) -> ProgressBar {
    ProgressBar::new(n as u64).with_style(get_master_progress_bar_style())
}

pub(crate) fn get_query_name_string(record: &bam::Record) -> Result<String, DebarcerError> {
    String::from_utf8(record.qname().to_vec())
        .map_err(|e| DebarcerError::input(format!("read name is not valid UTF-8: {e}")))
}

/// Recovers the UMI tag(s) from a read name. Debarcer encodes the UMI as the
/// suffix of the read name after the final `:`; multiple UMIs (paired
/// adapters) appear `;`-separated within that suffix.
pub fn umis_from_read_name(read_name: &str) -> Vec<&str> {
    match read_name.rsplit_once(':') {
        Some((_, suffix)) => suffix.split(';').collect(),
        None => vec![read_name],
    }
}

pub fn record_is_secondary(record: &bam::Record) -> bool {
    record.is_supplementary() || record.is_secondary() || record.is_duplicate()
}

pub(crate) fn get_targets(
    header: &HeaderView,
    region: Option<&Region>,
) -> Vec<ReferenceRecord> {
    (0..header.target_count())
        .filter_map(|tid| {
            let chrom_name = String::from_utf8(header.tid2name(tid).to_vec()).unwrap_or("???".to_owned());
            if let Some(region) = &region {
                if chrom_name == region.name {
                    Some(ReferenceRecord::new(tid, region.start, region.length(), chrom_name))
                } else {
                    None
                }
            } else {
                match header.target_len(tid) {
                    Some(size) => Some(ReferenceRecord::new(tid, 0, size as u32, chrom_name)),
                    None => {
                        debug!("> no size information for {chrom_name} (tid: {tid})");
                        None
                    }
                }
            }
        })
        .collect::<Vec<ReferenceRecord>>()
}

#[derive(Debug, new)]
pub struct ReferenceRecord {
    pub tid: u32,
    pub start: u32,
    pub length: u32,
    pub name: String,
}

/// A genomic interval. On the wire (CLI args, filenames, Datafile rows) this
/// is `chrN:start-end` with 1-based inclusive coordinates; internally it is
/// stored 0-based half-open to match `rust_htslib`/pysam conventions.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Region {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

impl Region {
    pub fn length(&self) -> u32 {
        self.end - self.start
    }

    fn parse_raw_with_start_and_end(raw: &str) -> Result<Self, DebarcerError> {
        let mut splitted = raw.split(':');
        let chrom_name = splitted
            .next()
            .ok_or_else(|| DebarcerError::input(format!("failed to parse region {raw}")))?;
        let start_end = splitted.collect::<Vec<&str>>();
        if start_end.len() != 1 {
            return Err(DebarcerError::input(format!("failed to parse region {raw}")));
        }
        let start_end = start_end[0];
        let splitted = start_end
            .split('-')
            .map(|x| x.parse::<u32>().map_err(|e| DebarcerError::input(e.to_string())))
            .collect::<Result<Vec<u32>, _>>()?;
        if splitted.len() != 2 {
            return Err(DebarcerError::input(format!("failed to parse region {raw}")));
        }
        let wire_start = splitted[0];
        let end = splitted[1];
        if end <= wire_start || wire_start == 0 {
            return Err(DebarcerError::input(format!(
                "failed to parse region {raw}, end must be after start and start must be 1-based"
            )));
        }
        Ok(Self {
            name: chrom_name.to_owned(),
            start: wire_start - 1,
            end,
        })
    }

    pub fn parse_str(raw: &str, header: &HeaderView) -> Result<Self, DebarcerError> {
        if raw.contains(':') {
            Self::parse_raw_with_start_and_end(raw)
        } else {
            let target_id = (0..header.target_count()).find_map(|tid| {
                String::from_utf8(header.tid2name(tid).to_vec())
                    .ok()
                    .and_then(|contig| if contig == raw { Some(tid) } else { None })
            });
            let target_length = target_id.and_then(|tid| header.target_len(tid));
            if let Some(len) = target_length {
                Ok(Self {
                    name: raw.to_owned(),
                    start: 0,
                    end: len as u32,
                })
            } else {
                Err(DebarcerError::input(format!(
                    "failed to find matching reference sequence for {raw} in BAM header"
                )))
            }
        }
    }

    pub fn get_fetch_definition(&self, header: &HeaderView) -> Result<bam::FetchDefinition, DebarcerError> {
        let tid = (0..header.target_count())
            .find_map(|tid| {
                String::from_utf8(header.tid2name(tid).to_vec())
                    .ok()
                    .and_then(|chrom| if chrom == self.name { Some(tid) } else { None })
            })
            .ok_or_else(|| DebarcerError::input(format!("failed to find target ID for chrom {}", self.name)))?;
        let tid = tid as i32;
        Ok(bam::FetchDefinition::Region(tid, self.start as i64, self.end as i64))
    }

    /// `chrN:start-end`, 1-based inclusive, as used for filenames and
    /// Datafile/Umifile records.
    pub fn to_wire_string(&self) -> String {
        format!("{}:{}-{}", self.name, self.start + 1, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parses_one_based_inclusive() {
        let region = Region::parse_raw_with_start_and_end("chr1:1000-2000").unwrap();
        assert_eq!(region.name, "chr1");
        assert_eq!(region.start, 999);
        assert_eq!(region.end, 2000);
        assert_eq!(region.to_wire_string(), "chr1:1000-2000");
    }

    #[test]
    fn region_rejects_malformed_string() {
        assert!(Region::parse_raw_with_start_and_end("chr1-1000").is_err());
        assert!(Region::parse_raw_with_start_and_end("chr1:2000-1000").is_err());
        assert!(Region::parse_raw_with_start_and_end("chr1:0-1000").is_err());
    }

    #[test]
    fn umi_tag_extraction_handles_multi_umi() {
        assert_eq!(umis_from_read_name("READ1:AAAA"), vec!["AAAA"]);
        assert_eq!(umis_from_read_name("READ1:AAAA;CCCC"), vec!["AAAA", "CCCC"]);
    }
}

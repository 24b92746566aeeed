use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result as AnyhowResult};
use rustc_hash::FxHashMap;

use crate::umi::UmiGroup;
use crate::util::Region;
use crate::writers::OutWriter;

/// One row of the Datafile summary: group/family counts for a region.
#[derive(Debug, Clone)]
pub struct DatafileRow {
    pub region: Region,
    pub parent_umi_total: u32,
    pub children_umi_total: u32,
    pub child_counts_per_parent: Vec<u32>,
    pub parent_frequencies: Vec<u32>,
}

impl DatafileRow {
    /// Summarizes the adjacency groups (component B output) for one region
    /// into the counts the Datafile reports: total parents, total
    /// children, the per-parent child count, and the per-parent
    /// observation-count histogram.
    pub fn from_groups(region: Region, groups: &[UmiGroup], counts: &FxHashMap<String, u32>) -> Self {
        let parent_umi_total = groups.len() as u32;
        let children_umi_total = groups.iter().map(|g| g.children.len() as u32).sum();
        let child_counts_per_parent = groups.iter().map(|g| g.children.len() as u32).collect();
        let parent_frequencies = groups.iter().map(|g| counts.get(&g.parent).copied().unwrap_or(0)).collect();
        Self {
            region,
            parent_umi_total,
            children_umi_total,
            child_counts_per_parent,
            parent_frequencies,
        }
    }
}

pub struct DatafileWriter {
    buf_writer: BufWriter<File>,
    header_written: bool,
}

impl DatafileWriter {
    pub fn new(buf_writer: BufWriter<File>) -> Self {
        Self { buf_writer, header_written: false }
    }
}

fn joined(values: &[u32]) -> String {
    values.iter().map(u32::to_string).collect::<Vec<_>>().join("|")
}

impl OutWriter<&DatafileRow> for DatafileWriter {
    fn write(&mut self, row: &DatafileRow) -> AnyhowResult<u64> {
        if !self.header_written {
            writeln!(self.buf_writer, "CHR\tSTART\tEND\tPTU\tCTU\tCHILD_NUMS\tFREQ_PARENTS").context("failed to write datafile header")?;
            self.header_written = true;
        }
        writeln!(
            self.buf_writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.region.name,
            row.region.start + 1,
            row.region.end,
            row.parent_umi_total,
            row.children_umi_total,
            joined(&row.child_counts_per_parent),
            joined(&row.parent_frequencies),
        )
        .context("failed to write datafile row")?;
        Ok(1)
    }
}

/// One row of the `Stats/UMI_relationships_{region}.txt` summary: one line
/// per observed UMI, naming whether it is a group's parent or a child,
/// its total observed count, its parent UMI, its Hamming distance from
/// that parent, and the median of its recorded read-start positions.
#[derive(Debug, Clone)]
pub struct GroupQcRow {
    pub umi: String,
    pub count: u32,
    pub parent: String,
    pub distance: u32,
    pub median_position: u32,
}

impl GroupQcRow {
    pub fn kind(&self) -> &'static str {
        if self.distance == 0 {
            "parent"
        } else {
            "child"
        }
    }
}

pub struct GroupQcWriter {
    buf_writer: BufWriter<File>,
    header_written: bool,
}

impl GroupQcWriter {
    pub fn new(buf_writer: BufWriter<File>) -> Self {
        Self { buf_writer, header_written: false }
    }
}

impl OutWriter<&GroupQcRow> for GroupQcWriter {
    fn write(&mut self, row: &GroupQcRow) -> AnyhowResult<u64> {
        if !self.header_written {
            writeln!(self.buf_writer, "UMI\tType\tCount\tParent\tDistance\tPosition").context("failed to write UMI relationships header")?;
            self.header_written = true;
        }
        writeln!(self.buf_writer, "{}\t{}\t{}\t{}\t{}\t{}", row.umi, row.kind(), row.count, row.parent, row.distance, row.median_position)
            .context("failed to write UMI relationship row")?;
        Ok(1)
    }
}

/// Median of an unsorted position list, matching the Python reference's
/// `statistics.median` semantics (average of the two middle values for an
/// even-length input).
pub fn median_position(positions: &[u32]) -> u32 {
    if positions.is_empty() {
        return 0;
    }
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        ((sorted[mid - 1] as u64 + sorted[mid] as u64) / 2) as u32
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_length_list() {
        assert_eq!(median_position(&[1000, 1010, 1005]), 1005);
    }

    #[test]
    fn median_of_even_length_list_averages_middle_pair() {
        assert_eq!(median_position(&[1000, 1010, 1005, 1020]), 1007);
    }

    #[test]
    fn datafile_row_summarizes_child_counts() {
        let groups = vec![
            UmiGroup { parent: "AAAAAA".into(), children: vec!["AAAAAT".into()] },
            UmiGroup { parent: "GGGGGG".into(), children: vec![] },
        ];
        let mut counts = FxHashMap::default();
        counts.insert("AAAAAA".to_string(), 11);
        counts.insert("GGGGGG".to_string(), 4);
        let region = Region { name: "chr1".into(), start: 999, end: 2000 };
        let row = DatafileRow::from_groups(region, &groups, &counts);
        assert_eq!(row.parent_umi_total, 2);
        assert_eq!(row.children_umi_total, 1);
        assert_eq!(row.child_counts_per_parent, vec![1, 0]);
        assert_eq!(row.parent_frequencies, vec![11, 4]);
    }
}

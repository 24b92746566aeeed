use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result as AnyhowResult};

use crate::writers::OutWriter;

/// One row of a consensus table: `(contig, position, family_size)` keyed,
/// per §3 `ConsensusRow`.
#[derive(Debug, Clone)]
pub struct ConsensusRow {
    pub contig: String,
    pub position: u32,
    pub ref_base: char,
    pub a: u32,
    pub c: u32,
    pub g: u32,
    pub t: u32,
    pub i: u32,
    pub d: u32,
    pub n: u32,
    pub raw_depth: u32,
    pub cons_depth: u32,
    /// The family-size threshold this row was computed under; 0 denotes
    /// the uncollapsed view.
    pub family_size: u32,
    pub ref_freq: f64,
    pub mean_fam: f64,
}

pub struct ConsensusTableWriter {
    buf_writer: BufWriter<File>,
    header_written: bool,
}

impl ConsensusTableWriter {
    pub fn new(buf_writer: BufWriter<File>) -> Self {
        Self { buf_writer, header_written: false }
    }

    fn write_header(&mut self) -> AnyhowResult<()> {
        writeln!(
            self.buf_writer,
            "CHROM\tPOS\tREF\tA\tC\tG\tT\tI\tD\tN\tRAWDP\tCONSDP\tFAM\tREF_FREQ\tMEAN_FAM"
        )
        .context("failed to write consensus table header")?;
        self.header_written = true;
        Ok(())
    }
}

impl OutWriter<&ConsensusRow> for ConsensusTableWriter {
    fn write(&mut self, row: &ConsensusRow) -> AnyhowResult<u64> {
        if !self.header_written {
            self.write_header()?;
        }
        writeln!(
            self.buf_writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{:.2}",
            row.contig,
            row.position + 1,
            row.ref_base,
            row.a,
            row.c,
            row.g,
            row.t,
            row.i,
            row.d,
            row.n,
            row.raw_depth,
            row.cons_depth,
            row.family_size,
            row.ref_freq,
            row.mean_fam,
        )
        .with_context(|| format!("failed to write consensus row at {}:{}", row.contig, row.position))?;
        Ok(1)
    }
}

impl OutWriter<&[ConsensusRow]> for ConsensusTableWriter {
    fn write(&mut self, rows: &[ConsensusRow]) -> AnyhowResult<u64> {
        let mut written = 0u64;
        for row in rows {
            written += OutWriter::<&ConsensusRow>::write(self, row)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn row() -> ConsensusRow {
        ConsensusRow {
            contig: "chr1".into(),
            position: 1004,
            ref_base: 'A',
            a: 0,
            c: 0,
            g: 1,
            t: 0,
            i: 0,
            d: 0,
            n: 0,
            raw_depth: 1,
            cons_depth: 1,
            family_size: 1,
            ref_freq: 0.0,
            mean_fam: 1.0,
        }
    }

    #[test]
    fn writes_header_then_one_based_position() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = ConsensusTableWriter::new(BufWriter::new(File::create(file.path()).unwrap()));
        OutWriter::<&ConsensusRow>::write(&mut writer, &row()).unwrap();
        drop(writer);

        let mut contents = String::new();
        File::open(file.path()).unwrap().read_to_string(&mut contents).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "CHROM\tPOS\tREF\tA\tC\tG\tT\tI\tD\tN\tRAWDP\tCONSDP\tFAM\tREF_FREQ\tMEAN_FAM");
        assert_eq!(lines.next().unwrap(), "chr1\t1005\tA\t0\t0\t1\t0\t0\t0\t0\t1\t1\t1\t0.00\t1.00");
    }
}

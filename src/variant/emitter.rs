use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result as AnyhowResult};
use serde::Deserialize;

use crate::errs::DebarcerError;
use crate::writers::OutWriter;

/// One deserialized row of a consensus table, matching the on-disk header
/// `CHROM POS REF A C G T I D N RAWDP CONSDP FAM REF_FREQ MEAN_FAM`.
#[derive(Debug, Clone, Deserialize)]
struct ConsensusTableRow {
    #[serde(rename = "CHROM")]
    chrom: String,
    #[serde(rename = "POS")]
    pos: u32,
    #[serde(rename = "REF")]
    reference: String,
    #[serde(rename = "A")]
    a: u32,
    #[serde(rename = "C")]
    c: u32,
    #[serde(rename = "G")]
    g: u32,
    #[serde(rename = "T")]
    t: u32,
    #[serde(rename = "I")]
    i: u32,
    #[serde(rename = "D")]
    d: u32,
    #[serde(rename = "N")]
    n: u32,
    #[serde(rename = "RAWDP")]
    raw_depth: u32,
    #[serde(rename = "CONSDP")]
    cons_depth: u32,
    #[serde(rename = "FAM")]
    family_size: u32,
    #[serde(rename = "REF_FREQ")]
    ref_freq: f64,
    #[serde(rename = "MEAN_FAM")]
    mean_fam: f64,
}

impl ConsensusTableRow {
    fn allele_counts(&self) -> [(&'static str, u32); 7] {
        [
            ("A", self.a),
            ("C", self.c),
            ("G", self.g),
            ("T", self.t),
            ("I", self.i),
            ("D", self.d),
            ("N", self.n),
        ]
    }
}

pub fn read_consensus_table(path: &Path) -> Result<Vec<ConsensusTableRow>, DebarcerError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|e| DebarcerError::input(format!("failed to open consensus table {}: {e}", path.display())))?;
    reader
        .deserialize()
        .collect::<Result<Vec<ConsensusTableRow>, _>>()
        .map_err(|e| DebarcerError::corrupt(format!("malformed consensus table row in {}: {e}", path.display())))
}

#[derive(Debug, Clone, Copy)]
pub struct VariantThresholds {
    pub ref_threshold: f64,
    pub alt_threshold: f64,
    pub filter_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub chrom: String,
    pub pos: u32,
    pub reference: String,
    pub alt_alleles: Vec<String>,
    pub alt_depths: Vec<u32>,
    pub alt_freqs: Vec<f64>,
    pub raw_depth: u32,
    pub cons_depth: u32,
    pub min_family_size: u32,
    pub mean_family_size: f64,
    pub family_size: u32,
    pub ref_depth: u32,
}

impl VariantRecord {
    pub fn filter_tag(&self, filter_threshold: u32) -> String {
        if self.alt_depths.iter().any(|&d| d >= filter_threshold) {
            "PASS".to_string()
        } else {
            format!("a{filter_threshold}")
        }
    }
}

/// Numeric-then-lexical chromosome ordering (§4.F): `chr2` sorts before
/// `chr10`, and named contigs (`chrX`, `chrM`) sort after all numeric ones.
fn chrom_sort_key(name: &str) -> (u8, u64, String) {
    let stripped = name.strip_prefix("chr").unwrap_or(name);
    match stripped.parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, name.to_owned()),
    }
}

/// Parses one or more consensus tables and emits variant records (4.F),
/// grouped by `(chromosome, family_size)` and ordered per §4.F/§5.
pub fn emit_variants(rows: &[ConsensusTableRow], thresholds: &VariantThresholds) -> Vec<VariantRecord> {
    let mut grouped: Vec<&ConsensusTableRow> = rows.iter().collect();
    grouped.sort_by(|a, b| {
        chrom_sort_key(&a.chrom)
            .cmp(&chrom_sort_key(&b.chrom))
            .then(a.family_size.cmp(&b.family_size))
            .then(a.pos.cmp(&b.pos))
    });

    let mut records = Vec::new();
    for row in grouped {
        if row.ref_freq > thresholds.ref_threshold {
            continue;
        }
        let total: u32 = row.allele_counts().iter().map(|(_, c)| *c).sum();
        if total == 0 {
            continue;
        }
        let ref_bucket = match row.reference.as_str() {
            "A" | "C" | "G" | "T" => row.reference.as_str(),
            _ => "N",
        };

        let mut alt_alleles = Vec::new();
        let mut alt_depths = Vec::new();
        let mut alt_freqs = Vec::new();
        for (allele, count) in row.allele_counts() {
            if allele == ref_bucket {
                continue;
            }
            let freq = (count as f64 / total as f64) * 100.0;
            if freq >= thresholds.alt_threshold {
                alt_alleles.push(allele.to_string());
                alt_depths.push(count);
                alt_freqs.push(freq);
            }
        }
        if alt_alleles.is_empty() {
            continue;
        }

        let ref_depth = row.allele_counts().iter().find(|(a, _)| *a == ref_bucket).map(|(_, c)| *c).unwrap_or(0);

        records.push(VariantRecord {
            chrom: row.chrom.clone(),
            pos: row.pos,
            reference: row.reference.clone(),
            alt_alleles,
            alt_depths,
            alt_freqs,
            raw_depth: row.raw_depth,
            cons_depth: row.cons_depth,
            min_family_size: row.family_size,
            mean_family_size: row.mean_fam,
            family_size: row.family_size,
            ref_depth,
        });
    }
    records
}

pub struct VcfWriter {
    buf_writer: BufWriter<File>,
}

impl VcfWriter {
    pub fn new(buf_writer: BufWriter<File>, reference_path: &str, file_date: &str, f_size: u32, filter_threshold: u32) -> AnyhowResult<Self> {
        let mut writer = Self { buf_writer };
        writer.write_header(reference_path, file_date, f_size, filter_threshold)?;
        Ok(writer)
    }

    fn write_header(&mut self, reference_path: &str, file_date: &str, f_size: u32, filter_threshold: u32) -> AnyhowResult<()> {
        writeln!(self.buf_writer, "##fileformat=VCFv4.1")?;
        writeln!(self.buf_writer, "##fileDate={file_date}")?;
        writeln!(self.buf_writer, "##reference={reference_path}")?;
        writeln!(self.buf_writer, "##source=Debarcer2")?;
        writeln!(self.buf_writer, "##f_size={f_size}")?;
        writeln!(self.buf_writer, "##INFO=<ID=RDP,Number=1,Type=Integer,Description=\"Raw Depth\">")?;
        writeln!(self.buf_writer, "##INFO=<ID=CDP,Number=1,Type=Integer,Description=\"Consensus Depth\">")?;
        writeln!(self.buf_writer, "##INFO=<ID=MIF,Number=1,Type=Integer,Description=\"Minimum Family Size\">")?;
        writeln!(self.buf_writer, "##INFO=<ID=MNF,Number=1,Type=Float,Description=\"Mean Family Size\">")?;
        writeln!(self.buf_writer, "##INFO=<ID=AD,Number=1,Type=Integer,Description=\"Reference Allele Depth\">")?;
        writeln!(self.buf_writer, "##INFO=<ID=AL,Number=.,Type=Integer,Description=\"Alternate Allele Depth(s)\">")?;
        writeln!(self.buf_writer, "##INFO=<ID=AF,Number=.,Type=Float,Description=\"Alternate Allele Frequency(ies)\">")?;
        writeln!(self.buf_writer, "##FILTER=<ID=a{filter_threshold},Description=\"Alternate allele depth below filter_threshold\">")?;
        writeln!(self.buf_writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
        Ok(())
    }
}

impl OutWriter<(&VariantRecord, u32)> for VcfWriter {
    fn write(&mut self, (record, filter_threshold): (&VariantRecord, u32)) -> AnyhowResult<u64> {
        let alt = record.alt_alleles.join(",");
        let al = record.alt_depths.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        let af = record.alt_freqs.iter().map(|f| format!("{f:.2}")).collect::<Vec<_>>().join(",");
        let info = format!(
            "RDP={};CDP={};MIF={};MNF={:.2};AD={};AL={};AF={}",
            record.raw_depth, record.cons_depth, record.min_family_size, record.mean_family_size, record.ref_depth, al, af
        );
        writeln!(
            self.buf_writer,
            "{}\t{}\t.\t{}\t{}\t.\t{}\t{}",
            record.chrom,
            record.pos,
            record.reference,
            alt,
            record.filter_tag(filter_threshold),
            info,
        )
        .with_context(|| format!("failed to write VCF record at {}:{}", record.chrom, record.pos))?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(chrom: &str, family_size: u32, pos: u32, reference: &str, a: u32, t: u32, raw_depth: u32, cons_depth: u32, ref_freq: f64) -> ConsensusTableRow {
        ConsensusTableRow {
            chrom: chrom.into(),
            pos,
            reference: reference.into(),
            a,
            c: 0,
            g: 0,
            t,
            i: 0,
            d: 0,
            n: 0,
            raw_depth,
            cons_depth,
            family_size,
            ref_freq,
            mean_fam: 3.0,
        }
    }

    #[test]
    fn scenario_vcf_emission() {
        let rows = vec![row("chr1", 3, 99, "A", 2, 18, 50, 20, 10.0)];
        let thresholds = VariantThresholds { ref_threshold: 95.0, alt_threshold: 2.0, filter_threshold: 10 };
        let records = emit_variants(&rows, &thresholds);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.alt_alleles, vec!["T".to_string()]);
        assert_eq!(record.alt_depths, vec![18]);
        assert_eq!(record.alt_freqs, vec![90.0]);
        assert_eq!(record.filter_tag(10), "PASS");
    }

    #[test]
    fn ref_freq_above_threshold_is_skipped() {
        let rows = vec![row("chr1", 1, 0, "A", 99, 1, 100, 100, 99.0)];
        let thresholds = VariantThresholds { ref_threshold: 95.0, alt_threshold: 2.0, filter_threshold: 10 };
        assert!(emit_variants(&rows, &thresholds).is_empty());
    }

    #[test]
    fn chromosomes_sort_numeric_then_lexical() {
        let rows = vec![
            row("chr10", 1, 5, "A", 1, 9, 10, 10, 0.0),
            row("chr2", 1, 5, "A", 1, 9, 10, 10, 0.0),
            row("chrX", 1, 5, "A", 1, 9, 10, 10, 0.0),
        ];
        let thresholds = VariantThresholds { ref_threshold: 95.0, alt_threshold: 2.0, filter_threshold: 10 };
        let records = emit_variants(&rows, &thresholds);
        let chroms: Vec<&str> = records.iter().map(|r| r.chrom.as_str()).collect();
        assert_eq!(chroms, vec!["chr2", "chr10", "chrX"]);
    }
}

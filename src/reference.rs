use std::path::Path;

use rust_htslib::faidx;

use crate::errs::DebarcerError;

/// Thin wrapper over an indexed reference FASTA, used by the consensus
/// engine to recover the reference base(s) under a pileup column
/// (including the extra bases a deletion's `PileupBase.ref_allele` spans).
pub struct ReferenceFasta {
    reader: faidx::Reader,
}

impl ReferenceFasta {
    pub fn from_path(path: &Path) -> Result<Self, DebarcerError> {
        let reader = faidx::Reader::from_path(path)
            .map_err(|e| DebarcerError::input(format!("failed to open reference FASTA {}: {e}", path.display())))?;
        Ok(Self { reader })
    }

    /// Fetches `[start, end)` (0-based half-open) from `contig`, upper-cased.
    pub fn fetch(&self, contig: &str, start: u32, end: u32) -> Result<String, DebarcerError> {
        if end <= start {
            return Ok(String::new());
        }
        let seq = self
            .reader
            .fetch_seq_string(contig, start as usize, (end - 1) as usize)
            .map_err(|e| DebarcerError::input(format!("failed to fetch reference {contig}:{start}-{end}: {e}")))?;
        Ok(seq.to_uppercase())
    }

    pub fn base_at(&self, contig: &str, pos: u32) -> Result<char, DebarcerError> {
        let seq = self.fetch(contig, pos, pos + 1)?;
        seq.chars().next().ok_or_else(|| DebarcerError::corrupt(format!("empty reference base at {contig}:{pos}")))
    }
}

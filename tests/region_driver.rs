//! End-to-end exercise of `RegionDriver` (component G) against a synthetic,
//! in-memory fixture: hand-built `UmiObservation`/`PileupColumn` values and a
//! tiny on-disk reference FASTA, with no real BAM file involved.

use std::io::Write;

use debarcer::consensus::{CollapseConfig, VoteThresholds};
use debarcer::pileup::{PileupColumn, PileupReadInfo, UmiObservation};
use debarcer::reference::ReferenceFasta;
use debarcer::region::{GroupConfig, OutputLayout, RegionDriver};
use debarcer::stats::{MappedReadCounts, SharedCoverageStats};
use debarcer::util::Region;
use debarcer::variant::VariantThresholds;

/// Writes a single-contig, single-line FASTA plus a hand-computed `.fai`
/// index beside it (`NAME\tLENGTH\tOFFSET\tLINEBASES\tLINEWIDTH`).
fn write_reference(dir: &std::path::Path, contig: &str, sequence: &str) -> std::path::PathBuf {
    let fasta_path = dir.join("reference.fa");
    let header = format!(">{contig}\n");
    let mut file = std::fs::File::create(&fasta_path).unwrap();
    file.write_all(header.as_bytes()).unwrap();
    writeln!(file, "{sequence}").unwrap();

    let fai_path = dir.join("reference.fa.fai");
    writeln!(
        std::fs::File::create(&fai_path).unwrap(),
        "{contig}\t{}\t{}\t{}\t{}",
        sequence.len(),
        header.len(),
        sequence.len(),
        sequence.len() + 1,
    )
    .unwrap();
    fasta_path
}

fn read_at(pos: u32, umi_count: u32, base: u8) -> PileupColumn {
    let reads = (0..umi_count)
        .map(|i| PileupReadInfo {
            read_name: format!("read-{pos}-{i}"),
            umis: vec!["AAAAAA".to_string()],
            leftmost_pos: 4,
            is_del: false,
            is_refskip: false,
            indel: 0,
            query_position: Some(0),
            query_base: Some(base),
            inserted_bases: None,
        })
        .collect();
    PileupColumn { reference_pos: pos, reads }
}

#[test]
fn region_driver_runs_group_collapse_and_call_against_a_synthetic_fixture() {
    let workdir = tempfile::tempdir().unwrap();
    let fasta_path = write_reference(workdir.path(), "chr1", "AAAAAAAAAA");
    let reference = ReferenceFasta::from_path(&fasta_path).unwrap();

    let region = Region { name: "chr1".to_string(), start: 4, end: 6 };
    assert_eq!(region.to_wire_string(), "chr1:5-6");

    // Four reads share one UMI at the region's single family anchor; the
    // adjacency graph collapses trivially to one parent with no children.
    let observations: Vec<UmiObservation> = (0..4)
        .map(|i| UmiObservation { umi: "AAAAAA".to_string(), leftmost_pos: 4, read_name: format!("read-{i}") })
        .collect();
    let mapped_counts = MappedReadCounts { mapped: 4, unmapped: 0 };

    // Position 4: every read calls G against a reference A -> a SNP.
    // Position 5: every read matches the reference -> no variant.
    let columns = vec![read_at(4, 4, b'G'), read_at(5, 4, b'A')];

    let outdir = workdir.path().join("out");
    let layout = OutputLayout::new(&outdir);
    let driver = RegionDriver::new(&layout);
    let coverage = SharedCoverageStats::default();

    let group_config = GroupConfig { dist_threshold: 1, pos_threshold: 5, ignore_group_remainders: false };
    let collapse_config = CollapseConfig {
        family_sizes: vec![2],
        pos_threshold: 5,
        vote: VoteThresholds { consensus_threshold: 50.0, count_threshold: 1 },
    };
    let variant_thresholds = VariantThresholds { ref_threshold: 95.0, alt_threshold: 50.0, filter_threshold: 1 };

    let outcome = driver
        .run(
            &region,
            || Ok((observations.clone(), mapped_counts.clone())),
            || Ok(columns.clone()),
            &reference,
            &coverage,
            &group_config,
            &collapse_config,
            Some((&variant_thresholds, "reference.fa", "20260731")),
        )
        .unwrap();

    assert_eq!(outcome.region.to_wire_string(), "chr1:5-6");
    // Two positions, each with an uncollapsed row plus one row for famsize=2.
    assert_eq!(outcome.consensus_rows, 4);
    // Only the position-4 SNP clears both the ref-frequency and
    // alt-frequency thresholds.
    assert_eq!(outcome.variant_records, 1);

    assert!(layout.umi_index_path(&region).exists());
    assert!(layout.datafile_path(&region).exists());
    assert!(layout.consensus_path(&region).exists());
    assert!(layout.umi_relationships_path(&region).exists());
    assert!(layout.pre_grouping_histogram_path(&region).exists());
    assert!(layout.mapped_counts_path(&region).exists());
    assert!(layout.vcf_path(&region, 2).exists());

    let vcf = std::fs::read_to_string(layout.vcf_path(&region, 2)).unwrap();
    let data_line = vcf.lines().find(|l| !l.starts_with('#')).expect("expected one variant record");
    assert!(data_line.starts_with("chr1\t5\t.\tA\tG\t"));

    // Re-running `group` against the same output directory reuses the
    // cached UmiIndex instead of rebuilding it from the (now empty) inputs.
    let reused = driver.group(&region, &[], &MappedReadCounts::default(), &group_config).unwrap();
    assert_eq!(reused.len(), 1);
}

#[test]
fn group_on_a_region_with_no_observations_writes_an_empty_index() {
    let workdir = tempfile::tempdir().unwrap();
    let outdir = workdir.path().join("out");
    let layout = OutputLayout::new(&outdir);
    let driver = RegionDriver::new(&layout);
    layout.ensure_dirs().unwrap();

    let region = Region { name: "chr2".to_string(), start: 0, end: 10 };
    let config = GroupConfig { dist_threshold: 1, pos_threshold: 5, ignore_group_remainders: false };
    let index = driver.group(&region, &[], &MappedReadCounts::default(), &config).unwrap();

    assert!(index.is_empty());
    assert!(layout.umi_index_path(&region).exists());
}

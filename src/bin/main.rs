use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyhowResult};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::bounded;
use log::{error, info};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rust_htslib::bam::{self, Read as BamRead};

use debarcer::config::{self, Config};
use debarcer::consensus::{CollapseConfig, VoteThresholds};
use debarcer::errs::DebarcerError;
use debarcer::logging::init_logging;
use debarcer::pileup::{self, PileupOptions, Stepper};
use debarcer::reference::ReferenceFasta;
use debarcer::region::{read_bed_regions, GroupConfig, OutputLayout, RegionDriver, RegionRunOutcome};
use debarcer::regions_discover::{find_regions_coverage, write_targets_bed};
use debarcer::stats::{CoverageStats, SharedCoverageStats};
use debarcer::umi::UmiIndex;
use debarcer::util::{get_master_progress_bar, Region};
use debarcer::variant::{self, VariantRecord, VariantThresholds, VcfWriter};
use debarcer::writers::OutWriter;

#[derive(Parser)]
#[command(name = "debarcer", version, about = "UMI-aware consensus calling for barcoded NGS reads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity: -v info, -vv debug, -vvv trace.
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all but warning/error logs.
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Tee logs to this file in addition to stderr.
    #[arg(long, global = true)]
    log_filepath: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds or refreshes a region's UMI family index (components B+C).
    Group(GroupArgs),
    /// Walks a region's pileup and writes its consensus table (components D+E).
    Collapse(CollapseArgs),
    /// Emits variant records from a consensus table (component F).
    Call(CallArgs),
    /// Runs the full pipeline (components A-F) over every region in a BED file.
    Run(RunArgs),
    /// Boundary-collaborator utilities outside the consensus core.
    Regions {
        #[command(subcommand)]
        action: RegionsAction,
    },
}

#[derive(Subcommand)]
enum RegionsAction {
    /// Discovers candidate target regions from BAM coverage.
    Discover(DiscoverArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum StepperArg {
    All,
    #[value(name = "nofilter")]
    NoFilter,
}

impl From<StepperArg> for Stepper {
    fn from(value: StepperArg) -> Self {
        match value {
            StepperArg::All => Stepper::All,
            StepperArg::NoFilter => Stepper::NoFilter,
        }
    }
}

#[derive(Args)]
struct GroupArgs {
    /// Coordinate-sorted, indexed input BAM file.
    #[arg(long)]
    bam: PathBuf,
    /// Region string `chrN:start-end` (1-based inclusive) or a bare contig name.
    #[arg(long)]
    region: String,
    /// INI config file; a value present there wins over the matching CLI flag.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory root; the §6 directory layout is created here.
    #[arg(long)]
    outdir: PathBuf,
    /// UMI adjacency Hamming-distance threshold (D).
    #[arg(long = "dist-threshold")]
    dist_threshold: Option<u32>,
    /// Positional family resolver threshold (P).
    #[arg(long = "pos-threshold")]
    pos_threshold: Option<u32>,
    /// Keep only the single most abundant family per UMI group.
    #[arg(long)]
    ignore: bool,
}

fn load_config(path: Option<&Path>) -> AnyhowResult<Option<Config>> {
    path.map(|p| Config::from_file(p).with_context(|| format!("loading config file {}", p.display())))
        .transpose()
}

fn run_group(args: &GroupArgs) -> AnyhowResult<()> {
    let config = load_config(args.config.as_deref())?;
    let dist_threshold = config::require_threshold(
        config.as_ref().and_then(Config::umi_edit_distance_threshold),
        args.dist_threshold,
        "--dist-threshold",
    )?;
    let pos_threshold = config::require_threshold(
        config.as_ref().and_then(Config::umi_family_pos_threshold),
        args.pos_threshold,
        "--pos-threshold",
    )?;

    let reader = bam::IndexedReader::from_path(&args.bam).with_context(|| format!("opening BAM {}", args.bam.display()))?;
    let region = Region::parse_str(&args.region, reader.header()).context("parsing --region")?;
    drop(reader);

    let layout = OutputLayout::new(&args.outdir);
    layout.ensure_dirs()?;
    let scan = pileup::scan_reads(&args.bam, &region)?;
    let driver = RegionDriver::new(&layout);
    let group_config = GroupConfig { dist_threshold, pos_threshold, ignore_group_remainders: args.ignore };
    let index = driver.group(&region, &scan.observations, &scan.counts, &group_config)?;
    info!("{}: grouped {} observed UMI(s)", region.to_wire_string(), index.len());
    Ok(())
}

#[derive(Args)]
struct CollapseArgs {
    #[arg(long)]
    bam: PathBuf,
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    region: String,
    /// Pre-built UmiIndex JSON (§6) produced by `debarcer group`.
    #[arg(long)]
    umifile: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    outdir: PathBuf,
    /// Family-size thresholds to collapse at, comma-separated; 0 (uncollapsed) is always emitted.
    #[arg(long = "famsize", value_delimiter = ',')]
    famsize: Vec<u32>,
    #[arg(long = "count-threshold")]
    count_threshold: Option<u32>,
    #[arg(long = "percent-threshold")]
    percent_threshold: Option<f64>,
    #[arg(long = "pos-threshold")]
    pos_threshold: Option<u32>,
    #[arg(long, default_value_t = 8_000)]
    max_depth: u32,
    #[arg(long)]
    truncate: bool,
    #[arg(long = "ignore-orphans")]
    ignore_orphans: bool,
    #[arg(long, value_enum, default_value = "all")]
    stepper: StepperArg,
}

fn run_collapse(args: &CollapseArgs) -> AnyhowResult<()> {
    let config = load_config(args.config.as_deref())?;
    let pos_threshold = config::require_threshold(
        config.as_ref().and_then(Config::umi_family_pos_threshold),
        args.pos_threshold,
        "--pos-threshold",
    )?;
    let count_threshold = config::require_threshold(
        config.as_ref().and_then(Config::count_consensus_threshold),
        args.count_threshold,
        "--count-threshold",
    )?;
    let percent_threshold = config::require_threshold(
        config.as_ref().and_then(Config::percent_consensus_threshold),
        args.percent_threshold,
        "--percent-threshold",
    )?;
    let family_sizes: Vec<u32> = if !args.famsize.is_empty() {
        args.famsize.clone()
    } else {
        config
            .as_ref()
            .and_then(Config::min_family_sizes)
            .unwrap_or_else(|| vec![1])
    }
    .into_iter()
    .filter(|&f| f != 0)
    .collect();

    let reader = bam::IndexedReader::from_path(&args.bam).with_context(|| format!("opening BAM {}", args.bam.display()))?;
    let region = Region::parse_str(&args.region, reader.header()).context("parsing --region")?;
    drop(reader);

    let layout = OutputLayout::new(&args.outdir);
    layout.ensure_dirs()?;
    let reference = ReferenceFasta::from_path(&args.reference)?;
    let index = UmiIndex::read_from_file(&args.umifile)?;
    let coverage = SharedCoverageStats::new(CoverageStats::load_or_default(&layout.coverage_stats_path())?);

    let pileup_options = PileupOptions {
        max_depth: args.max_depth,
        truncate: args.truncate,
        ignore_orphans: args.ignore_orphans,
        stepper: args.stepper.into(),
    };
    let collapse_config = CollapseConfig {
        family_sizes,
        pos_threshold,
        vote: VoteThresholds { consensus_threshold: percent_threshold, count_threshold },
    };

    let driver = RegionDriver::new(&layout);
    let rows = driver.collapse(
        &region,
        || pileup::pileup_columns(&args.bam, &region, &pileup_options),
        &reference,
        &index,
        &collapse_config,
        &coverage,
    )?;
    coverage.write_to_file(&layout.coverage_stats_path())?;
    info!("{}: wrote {} consensus row(s)", region.to_wire_string(), rows.len());
    Ok(())
}

#[derive(Args)]
struct CallArgs {
    /// Consensus table(s) to read, possibly pre-merged across regions.
    #[arg(long)]
    consfile: PathBuf,
    /// Family-size thresholds to emit VCF files for; defaults to every size present in the table.
    #[arg(long = "famsize", value_delimiter = ',')]
    famsize: Vec<u32>,
    #[arg(long = "ref-threshold")]
    ref_threshold: Option<f64>,
    #[arg(long = "alt-threshold")]
    alt_threshold: Option<f64>,
    #[arg(long = "filter-threshold")]
    filter_threshold: Option<u32>,
    #[arg(long)]
    outdir: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reference FASTA path recorded in the VCF header only.
    #[arg(long)]
    reference: Option<PathBuf>,
}

fn run_call(args: &CallArgs) -> AnyhowResult<()> {
    let config = load_config(args.config.as_deref())?;
    let ref_threshold = config::require_threshold(
        config.as_ref().and_then(Config::percent_ref_threshold),
        args.ref_threshold,
        "--ref-threshold",
    )?;
    let alt_threshold = config::require_threshold(
        config.as_ref().and_then(Config::percent_alt_threshold),
        args.alt_threshold,
        "--alt-threshold",
    )?;
    let filter_threshold = config::require_threshold(
        config.as_ref().and_then(Config::filter_threshold),
        args.filter_threshold,
        "--filter-threshold",
    )?;
    let thresholds = VariantThresholds { ref_threshold, alt_threshold, filter_threshold };

    let rows = variant::read_consensus_table(&args.consfile)?;
    let records = variant::emit_variants(&rows, &thresholds);

    let family_sizes: Vec<u32> = if !args.famsize.is_empty() {
        args.famsize.clone()
    } else {
        let mut sizes: Vec<u32> = records.iter().map(|r| r.family_size).collect();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    };

    let stem = args
        .consfile
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let vcf_dir = args.outdir.join("VCFfiles");
    std::fs::create_dir_all(&vcf_dir)?;
    let file_date = Local::now().format("%Y%m%d").to_string();
    let reference_path = args
        .reference
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut total = 0usize;
    for f in family_sizes.iter().copied() {
        let subset: Vec<&VariantRecord> = records.iter().filter(|r| r.family_size == f).collect();
        let path = vcf_dir.join(format!("{stem}_umifam_{f}.vcf"));
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = VcfWriter::new(BufWriter::new(file), &reference_path, &file_date, f, filter_threshold)?;
        for record in &subset {
            OutWriter::<(&VariantRecord, u32)>::write(&mut writer, (record, filter_threshold))?;
        }
        total += subset.len();
    }
    info!("wrote {total} variant record(s) across {} family-size file(s)", family_sizes.len());
    Ok(())
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    bam: PathBuf,
    #[arg(long)]
    reference: PathBuf,
    /// BED file of regions to process in parallel.
    #[arg(long)]
    bed: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    outdir: PathBuf,
    #[arg(long, default_value_t = 4)]
    threads: usize,
    #[arg(long = "dist-threshold")]
    dist_threshold: Option<u32>,
    #[arg(long = "pos-threshold")]
    pos_threshold: Option<u32>,
    #[arg(long)]
    ignore: bool,
    #[arg(long = "famsize", value_delimiter = ',')]
    famsize: Vec<u32>,
    #[arg(long = "count-threshold")]
    count_threshold: Option<u32>,
    #[arg(long = "percent-threshold")]
    percent_threshold: Option<f64>,
    #[arg(long = "ref-threshold")]
    ref_threshold: Option<f64>,
    #[arg(long = "alt-threshold")]
    alt_threshold: Option<f64>,
    #[arg(long = "filter-threshold")]
    filter_threshold: Option<u32>,
    #[arg(long, default_value_t = 8_000)]
    max_depth: u32,
    #[arg(long)]
    truncate: bool,
    #[arg(long = "ignore-orphans")]
    ignore_orphans: bool,
    #[arg(long, value_enum, default_value = "all")]
    stepper: StepperArg,
}

fn run_pipeline(args: &RunArgs) -> AnyhowResult<()> {
    let config = load_config(args.config.as_deref())?;
    let dist_threshold = config::require_threshold(
        config.as_ref().and_then(Config::umi_edit_distance_threshold),
        args.dist_threshold,
        "--dist-threshold",
    )?;
    let pos_threshold = config::require_threshold(
        config.as_ref().and_then(Config::umi_family_pos_threshold),
        args.pos_threshold,
        "--pos-threshold",
    )?;
    let count_threshold = config::require_threshold(
        config.as_ref().and_then(Config::count_consensus_threshold),
        args.count_threshold,
        "--count-threshold",
    )?;
    let percent_threshold = config::require_threshold(
        config.as_ref().and_then(Config::percent_consensus_threshold),
        args.percent_threshold,
        "--percent-threshold",
    )?;
    let ref_threshold = config::require_threshold(
        config.as_ref().and_then(Config::percent_ref_threshold),
        args.ref_threshold,
        "--ref-threshold",
    )?;
    let alt_threshold = config::require_threshold(
        config.as_ref().and_then(Config::percent_alt_threshold),
        args.alt_threshold,
        "--alt-threshold",
    )?;
    let filter_threshold = config::require_threshold(
        config.as_ref().and_then(Config::filter_threshold),
        args.filter_threshold,
        "--filter-threshold",
    )?;

    let family_sizes: Vec<u32> = if !args.famsize.is_empty() {
        args.famsize.clone()
    } else {
        config
            .as_ref()
            .and_then(Config::min_family_sizes)
            .unwrap_or_else(|| vec![1])
    }
    .into_iter()
    .filter(|&f| f != 0)
    .collect();

    let regions = read_bed_regions(&args.bed).context("reading --bed")?;
    if regions.is_empty() {
        anyhow::bail!("--bed file contains no regions");
    }

    let layout = OutputLayout::new(&args.outdir);
    layout.ensure_dirs()?;
    let coverage = SharedCoverageStats::new(CoverageStats::load_or_default(&layout.coverage_stats_path())?);
    let reference_path_str = args.reference.display().to_string();
    let file_date = Local::now().format("%Y%m%d").to_string();

    let group_config = GroupConfig { dist_threshold, pos_threshold, ignore_group_remainders: args.ignore };
    let collapse_config = CollapseConfig {
        family_sizes,
        pos_threshold,
        vote: VoteThresholds { consensus_threshold: percent_threshold, count_threshold },
    };
    let variant_thresholds = VariantThresholds { ref_threshold, alt_threshold, filter_threshold };
    let pileup_options = PileupOptions {
        max_depth: args.max_depth,
        truncate: args.truncate,
        ignore_orphans: args.ignore_orphans,
        stepper: args.stepper.into(),
    };

    let pool = ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .context("building region worker thread pool")?;
    let driver = RegionDriver::new(&layout);
    let progress = get_master_progress_bar(regions.len());
    let (failure_tx, failure_rx) = bounded::<String>(regions.len());
    let bam_path = &args.bam;
    let reference_path = &args.reference;

    pool.install(|| {
        regions.par_iter().for_each(|region| {
            let outcome: Result<RegionRunOutcome, DebarcerError> = (|| {
                let reference = ReferenceFasta::from_path(reference_path)?;
                driver.run(
                    region,
                    || pileup::scan_reads(bam_path, region).map(|scan| (scan.observations, scan.counts)),
                    || pileup::pileup_columns(bam_path, region, &pileup_options),
                    &reference,
                    &coverage,
                    &group_config,
                    &collapse_config,
                    Some((&variant_thresholds, &reference_path_str, &file_date)),
                )
            })();

            match outcome {
                Ok(result) => info!(
                    "{}: {} consensus row(s), {} variant record(s)",
                    result.region.to_wire_string(),
                    result.consensus_rows,
                    result.variant_records
                ),
                Err(err) => {
                    error!("{}: {err}", region.to_wire_string());
                    let _ = failure_tx.send(region.to_wire_string());
                }
            }
            progress.inc(1);
        });
    });
    progress.finish_with_message("done");
    drop(failure_tx);

    coverage.write_to_file(&layout.coverage_stats_path())?;

    let failures: Vec<String> = failure_rx.iter().collect();
    if !failures.is_empty() {
        anyhow::bail!("{} of {} region(s) failed: {}", failures.len(), regions.len(), failures.join(", "));
    }
    Ok(())
}

#[derive(Args)]
struct DiscoverArgs {
    #[arg(long)]
    bam: PathBuf,
    /// Minimum depth a sub-interval must sustain to be kept.
    #[arg(long = "min-cov")]
    min_cov: u32,
    /// Minimum length of a candidate region.
    #[arg(long = "region-size")]
    region_size: u32,
    #[arg(long)]
    outdir: PathBuf,
    #[arg(long, default_value_t = 8_000)]
    max_depth: u32,
    #[arg(long = "ignore-orphans")]
    ignore_orphans: bool,
    #[arg(long, value_enum, default_value = "all")]
    stepper: StepperArg,
}

fn run_regions_discover(args: &DiscoverArgs) -> AnyhowResult<()> {
    std::fs::create_dir_all(&args.outdir)?;
    let reader = bam::IndexedReader::from_path(&args.bam).with_context(|| format!("opening BAM {}", args.bam.display()))?;
    let header = reader.header();
    let targets: Vec<(String, u32)> = (0..header.target_count())
        .filter_map(|tid| {
            let name = String::from_utf8(header.tid2name(tid).to_vec()).ok()?;
            let len = header.target_len(tid)? as u32;
            Some((name, len))
        })
        .collect();
    drop(reader);

    let pileup_options = PileupOptions {
        max_depth: args.max_depth,
        truncate: true,
        ignore_orphans: args.ignore_orphans,
        stepper: args.stepper.into(),
    };

    let mut all_regions = Vec::new();
    for (contig, length) in &targets {
        let regions = find_regions_coverage(&args.bam, contig, *length, args.min_cov, args.region_size, &pileup_options)?;
        info!("{contig}: {} candidate region(s)", regions.len());
        all_regions.extend(regions);
    }

    let bed_path = args.outdir.join("discovered_regions.bed");
    write_targets_bed(&bed_path, &all_regions)?;
    info!("wrote {} region(s) to {}", all_regions.len(), bed_path.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let verbosity = if cli.quiet { 0 } else { cli.verbose };
    init_logging(verbosity, cli.log_filepath.as_ref());

    let result = match &cli.command {
        Commands::Group(args) => run_group(args),
        Commands::Collapse(args) => run_collapse(args),
        Commands::Call(args) => run_call(args),
        Commands::Run(args) => run_pipeline(args),
        Commands::Regions { action } => match action {
            RegionsAction::Discover(args) => run_regions_discover(args),
        },
    };

    if let Err(err) = result {
        eprintln!("ERR: {err:#}");
        std::process::exit(1);
    }
}

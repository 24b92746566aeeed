pub mod reader;

pub use reader::{
    pileup_columns, scan_reads, umi_observations, PileupColumn, PileupOptions, PileupReadInfo, ReadScan, Stepper,
    UmiObservation,
};

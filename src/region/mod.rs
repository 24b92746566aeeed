pub mod bed;
pub mod driver;

pub use bed::read_bed_regions;
pub use driver::{GroupConfig, OutputLayout, RegionDriver, RegionRunOutcome};

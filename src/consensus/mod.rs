pub mod driver;
pub mod engine;
pub mod table;

pub use driver::{compute_region_consensus, CollapseConfig};
pub use engine::{pileup_base_full, tally_uncollapsed, vote_column, FamilyColumnObservation, PileupBase, PositionConsensus, VoteThresholds};
pub use table::{ConsensusRow, ConsensusTableWriter};

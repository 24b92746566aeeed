pub mod emitter;

pub use emitter::{emit_variants, read_consensus_table, VariantRecord, VariantThresholds, VcfWriter};

use anyhow::Result as AnyhowResult;

/// Implemented by every artifact writer in the crate (consensus tables,
/// Datafile/GroupQC summaries, VCF records): `write` consumes one item and
/// returns the number of rows/records it produced.
pub trait OutWriter<T> {
    fn write(&mut self, item: T) -> AnyhowResult<u64>;
}

//! Per-instance state slots.
//!
//! Compiled sources and effects keep their persistent state in a flat
//! slot table owned by the instance, indexed by offsets assigned during
//! `prepare`. Each source's slot range is contiguous and disjoint from
//! every other source's. Dropping a cell tears its state down, which is
//! what frees the stretch effect's DSP object.

use crate::effect::stretch::StretchState;
use crate::source::chain::ChainState;
use crate::source::sound::SoundState;
use crate::source::wave::WaveState;
use ostinato_core::PooledBuffer;

pub(crate) enum StateCell {
    Empty,
    Wave(WaveState),
    Sound(SoundState),
    Chain(ChainState),
    /// Per-child scratch leases of a select/solo group; only populated
    /// within one generate call.
    GroupBuffers(Vec<Option<PooledBuffer>>),
    Stretch(Box<StretchState>),
}

/// Allocate a fresh table of `size` empty cells.
pub(crate) fn new_state_table(size: usize) -> Vec<StateCell> {
    let mut table = Vec::with_capacity(size);
    table.resize_with(size, || StateCell::Empty);
    table
}

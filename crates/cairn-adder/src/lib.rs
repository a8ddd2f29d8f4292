//! The cairn add pipeline.
//!
//! An [`Adder`] consumes an ordered stream of file and directory entries
//! and turns it into a replicated, pinned Merkle DAG:
//!
//! 1. The [`Allocator`](cairn_placement::Allocator) picks the peer set once,
//!    before any block is built.
//! 2. The [`TreeReconstructor`] chunks files, lays out their DAGs and
//!    finalises directories, emitting each block as soon as it exists.
//! 3. The [`Distributor`] stores every block on its peers, bounded by a
//!    fixed number of blocks in flight.
//! 4. The [`PinCommitter`] records the pin once the whole DAG is stored.
//!
//! Entry streams come from any [`EntrySource`]; [`MemoryEntries`] and
//! [`FsWalk`] are provided.

mod adder;
mod distributor;
mod entry;
mod error;
mod pin;
mod reconstructor;
mod walk;

pub use adder::{AbortHandle, AddSummary, Adder};
pub use distributor::{DistributionReport, DistributionSettings, Distributor};
pub use entry::{Entry, EntryKind, EntryReader, EntrySource, MemoryEntries};
pub use error::AddError;
pub use pin::PinCommitter;
pub use reconstructor::{ReconstructorConfig, TreeReconstructor};
pub use walk::FsWalk;

#[cfg(test)]
mod tests;

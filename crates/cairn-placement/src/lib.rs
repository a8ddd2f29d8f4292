//! Peer allocation under replication bounds.
//!
//! An [`Allocation`] is computed once for the root of an add operation and
//! shared, immutable, by every block of its DAG. Candidates that were
//! eligible but not selected are kept as a ranked standby list, which
//! per-block retries draw from when an allocated peer fails.

mod allocator;
mod error;

pub use allocator::{Allocation, Allocator};
pub use error::PlacementError;

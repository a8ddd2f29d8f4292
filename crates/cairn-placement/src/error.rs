//! Error types for peer allocation.

/// Errors that can occur while allocating peers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// Fewer eligible peers than the replication minimum.
    #[error("insufficient replicas: need {needed}, {available} eligible")]
    InsufficientReplicas {
        /// Replication minimum.
        needed: usize,
        /// Eligible peers found.
        available: usize,
    },

    /// Replication bounds are inconsistent.
    #[error("invalid replication bounds: min={min}, max={max}")]
    InvalidBounds { min: usize, max: usize },
}

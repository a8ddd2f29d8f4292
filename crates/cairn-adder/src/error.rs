//! Error types for the add pipeline.

use cairn_dag::DagError;
use cairn_placement::PlacementError;
use cairn_rpc::RpcError;
use cairn_types::{Cid, ParamsError};

/// Terminal failure of an add operation.
#[derive(Debug, thiserror::Error)]
pub enum AddError {
    /// Add parameters failed validation.
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    /// Entries arrived out of valid nesting order, or were otherwise invalid.
    #[error("malformed input at {path:?}: {reason}")]
    MalformedInput {
        /// Offending entry path.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Fewer eligible peers than the replication minimum.
    #[error("insufficient replicas: need {needed}, {available} eligible")]
    InsufficientReplicas {
        /// Replication minimum.
        needed: usize,
        /// Eligible peers found.
        available: usize,
    },

    /// A block could not reach its minimum acknowledgements.
    #[error("distribution of block {cid} failed: {acked}/{needed} acks, last error: {last_error}")]
    Distribution {
        /// The block that failed.
        cid: Cid,
        /// Acknowledgements required.
        needed: usize,
        /// Acknowledgements received.
        acked: usize,
        /// Last peer error observed.
        last_error: String,
    },

    /// The pin ledger refused the final pin.
    #[error("pin commit for {cid} failed: {source}")]
    PinCommit {
        /// Root of the DAG that was being pinned.
        cid: Cid,
        /// Ledger error.
        source: RpcError,
    },

    /// A cluster call outside distribution failed.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Building the DAG failed.
    #[error("dag error: {0}")]
    Dag(#[from] DagError),

    /// Reading input failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was aborted or hit its deadline.
    #[error("add operation cancelled")]
    Cancelled,

    /// Distribution stopped accepting blocks before the DAG was complete.
    #[error("distribution stopped before the DAG was complete")]
    DistributorStopped,

    /// A pipeline task panicked or was torn down.
    #[error("task failed: {0}")]
    Task(String),
}

impl AddError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        AddError::MalformedInput {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<PlacementError> for AddError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::InsufficientReplicas { needed, available } => {
                AddError::InsufficientReplicas { needed, available }
            }
            PlacementError::InvalidBounds { min, max } => {
                AddError::InvalidParams(ParamsError::Replication { min, max })
            }
        }
    }
}

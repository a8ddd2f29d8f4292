//! Error types for cluster RPC calls.

use cairn_types::{Cid, PeerId};

/// Errors returned by a [`ClusterRpc`](crate::ClusterRpc) adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The peer could not be reached.
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable {
        /// Target peer.
        peer: PeerId,
        /// Transport-level reason.
        reason: String,
    },

    /// The peer refused to store the block.
    #[error("peer {peer} rejected block {cid}: {reason}")]
    Rejected {
        peer: PeerId,
        cid: Cid,
        reason: String,
    },

    /// Block data does not hash to its CID.
    #[error("integrity check failed for block {expected}: actual hash {actual}")]
    IntegrityFailure {
        /// The CID the block claimed.
        expected: Cid,
        /// The hash of the data received.
        actual: Cid,
    },

    /// The pin ledger refused the pin.
    #[error("pin ledger error: {0}")]
    PinLedger(String),

    /// The candidate provider could not answer.
    #[error("peer candidate provider error: {0}")]
    Provider(String),
}

impl RpcError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Unreachable { .. })
    }
}

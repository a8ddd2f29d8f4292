//! Cluster RPC capability consumed by the adder.
//!
//! The adder never talks to a concrete transport. It drives three calls
//! through [`ClusterRpc`]: storing a block on one peer, committing a pin to
//! the cluster ledger, and asking which peers are currently eligible.
//! [`LocalCluster`] implements the capability in process, with failure
//! injection for tests and the bundled CLI.

mod error;
mod local;

use cairn_types::{Block, PeerId, Pin};

pub use error::RpcError;
pub use local::{LocalCluster, PeerStats};

/// Remote operations the adder depends on.
#[async_trait::async_trait]
pub trait ClusterRpc: Send + Sync {
    /// Store `block` on `peer`. Succeeds once the peer acknowledged it.
    async fn store_block(&self, peer: PeerId, block: Block) -> Result<(), RpcError>;

    /// Record `pin` in the cluster pin ledger.
    async fn commit_pin(&self, pin: Pin) -> Result<(), RpcError>;

    /// Peers currently eligible to hold data, best first.
    ///
    /// `min` and `max` are hints; the caller enforces the bounds.
    async fn eligible_peers(&self, min: usize, max: usize) -> Result<Vec<PeerId>, RpcError>;
}

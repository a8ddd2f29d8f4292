//! Final step of an add: recording the pin.

use std::sync::Arc;

use cairn_placement::Allocation;
use cairn_rpc::ClusterRpc;
use cairn_types::{AddParams, Cid, PeerId, Pin};
use tracing::{error, info};

use crate::error::AddError;

/// Commits the pin of a fully distributed DAG.
pub struct PinCommitter {
    rpc: Arc<dyn ClusterRpc>,
}

impl PinCommitter {
    pub fn new(rpc: Arc<dyn ClusterRpc>) -> Self {
        Self { rpc }
    }

    /// Build the pin record for `root`.
    ///
    /// `holders` are the peers that acknowledged the root block. The pin
    /// lists them in allocation rank order, standby peers last.
    pub fn pin_for(
        root: Cid,
        params: &AddParams,
        allocation: &Allocation,
        holders: &[PeerId],
    ) -> Pin {
        Pin {
            cid: root,
            name: params.name.clone(),
            replication_factor_min: params.replication_factor_min,
            replication_factor_max: params.replication_factor_max,
            allocations: allocation
                .ranked()
                .filter(|peer| holders.contains(peer))
                .copied()
                .collect(),
            metadata: params.metadata.clone(),
        }
    }

    /// Send `pin` to the ledger. Called only once every block is stored.
    pub async fn commit(&self, pin: Pin) -> Result<Pin, AddError> {
        let cid = pin.cid;
        match self.rpc.commit_pin(pin.clone()).await {
            Ok(()) => {
                info!(%cid, allocations = pin.allocations.len(), "pin committed");
                Ok(pin)
            }
            Err(source) => {
                error!(%cid, error = %source, "pin commit failed");
                Err(AddError::PinCommit { cid, source })
            }
        }
    }
}

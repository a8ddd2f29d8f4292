//! Ships emitted blocks to their allocated peers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cairn_placement::Allocation;
use cairn_rpc::{ClusterRpc, RpcError};
use cairn_types::{AddParams, Block, Cid, PeerId};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::AddError;

/// Retry and concurrency knobs of the distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionSettings {
    /// Blocks in flight at once.
    pub max_outstanding_blocks: usize,
    /// Store attempts per peer.
    pub peer_attempts: u32,
    /// Backoff unit between attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl From<&AddParams> for DistributionSettings {
    fn from(params: &AddParams) -> Self {
        Self {
            max_outstanding_blocks: params.max_outstanding_blocks.max(1),
            peer_attempts: params.peer_attempts.max(1),
            retry_backoff: Duration::from_millis(params.retry_backoff_ms),
        }
    }
}

/// Totals of one distribution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Distinct blocks stored.
    pub blocks: usize,
    /// Emissions skipped because the block had already been sent.
    pub duplicates: usize,
    /// Encoded bytes of the distinct blocks.
    pub bytes: u64,
    /// Acknowledged stores per peer, replicas beyond the minimum included.
    pub acks: BTreeMap<PeerId, usize>,
    /// Peers that acknowledged each distinct block, in completion order.
    pub holders: BTreeMap<Cid, Vec<PeerId>>,
}

impl DistributionReport {
    /// Peers holding `cid`, empty if the block was never distributed.
    pub fn holders_of(&self, cid: &Cid) -> &[PeerId] {
        self.holders.get(cid).map(Vec::as_slice).unwrap_or_default()
    }

    fn record(&mut self, stored: Stored) {
        for peer in &stored.acked {
            *self.acks.entry(*peer).or_default() += 1;
        }
        self.holders.insert(stored.cid, stored.acked);
    }
}

type PeerResult = Result<PeerId, (PeerId, RpcError)>;

/// A block whose every send finished, with the peers that acknowledged it.
struct Stored {
    cid: Cid,
    acked: Vec<PeerId>,
}

/// Sends every block it receives to the peers of one [`Allocation`].
///
/// Each block is sent to all allocated peers concurrently and counts as
/// stored once `allocation.min()` peers acknowledged it. A peer that fails
/// before the minimum is reached is replaced by the next standby candidate
/// for that block only. A block keeps its slot among the
/// `max_outstanding_blocks` until its last send finished, so a slow replica
/// throttles the pipeline instead of piling up sends.
pub struct Distributor {
    rpc: Arc<dyn ClusterRpc>,
    allocation: Arc<Allocation>,
    settings: DistributionSettings,
}

impl Distributor {
    pub fn new(
        rpc: Arc<dyn ClusterRpc>,
        allocation: Arc<Allocation>,
        settings: DistributionSettings,
    ) -> Self {
        Self {
            rpc,
            allocation,
            settings,
        }
    }

    /// Distribute blocks until the channel closes.
    ///
    /// Fails on the first block that cannot reach its minimum; dropping the
    /// returned future aborts every send still in flight.
    pub async fn run(self, mut blocks: mpsc::Receiver<Block>) -> Result<DistributionReport, AddError> {
        let permits = Arc::new(Semaphore::new(self.settings.max_outstanding_blocks));
        let mut tasks: JoinSet<Result<Stored, AddError>> = JoinSet::new();
        let mut seen: HashSet<Cid> = HashSet::new();
        let mut report = DistributionReport::default();

        loop {
            tokio::select! {
                biased;
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let stored = joined.map_err(|e| AddError::Task(e.to_string()))??;
                    report.record(stored);
                }
                next = blocks.recv() => {
                    let Some(block) = next else { break };
                    if !seen.insert(block.cid) {
                        report.duplicates += 1;
                        continue;
                    }
                    report.blocks += 1;
                    report.bytes += block.len() as u64;

                    let permit = permits
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|e| AddError::Task(e.to_string()))?;
                    let rpc = self.rpc.clone();
                    let allocation = self.allocation.clone();
                    let settings = self.settings;
                    tasks.spawn(async move {
                        let stored = store_block(rpc, allocation, block, settings).await;
                        drop(permit);
                        stored
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let stored = joined.map_err(|e| AddError::Task(e.to_string()))??;
            report.record(stored);
        }

        info!(
            blocks = report.blocks,
            duplicates = report.duplicates,
            bytes = report.bytes,
            "distribution complete"
        );
        Ok(report)
    }
}

/// Send one block to its peers and wait for every send to finish.
///
/// Fails when fewer than `min` peers acknowledged the block.
async fn store_block(
    rpc: Arc<dyn ClusterRpc>,
    allocation: Arc<Allocation>,
    block: Block,
    settings: DistributionSettings,
) -> Result<Stored, AddError> {
    let cid = block.cid;
    let needed = allocation.min();
    let mut tried: HashSet<PeerId> = allocation.peers().iter().copied().collect();
    let mut sends = JoinSet::new();
    for peer in allocation.peers() {
        sends.spawn(store_on_peer(rpc.clone(), *peer, block.clone(), settings));
    }

    let mut acked = Vec::with_capacity(allocation.peers().len());
    let mut last_error = String::from("no peer attempted");
    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok(Ok(peer)) => {
                acked.push(peer);
                if acked.len() == needed {
                    debug!(%cid, acks = needed, "block stored");
                }
            }
            Ok(Err((peer, err))) if acked.len() >= needed => {
                warn!(%cid, %peer, error = %err, "replica beyond minimum not stored");
            }
            Ok(Err((peer, err))) => {
                last_error = err.to_string();
                match allocation.fallback(&tried) {
                    Some(next) => {
                        warn!(%cid, failed = %peer, fallback = %next, "peer failed, trying standby");
                        tried.insert(next);
                        sends.spawn(store_on_peer(rpc.clone(), next, block.clone(), settings));
                    }
                    None => warn!(%cid, failed = %peer, "peer failed, no standby left"),
                }
            }
            Err(err) => last_error = err.to_string(),
        }
    }

    if acked.len() < needed {
        return Err(AddError::Distribution {
            cid,
            needed,
            acked: acked.len(),
            last_error,
        });
    }
    Ok(Stored { cid, acked })
}

/// Store on one peer, retrying transient failures with linear backoff.
async fn store_on_peer(
    rpc: Arc<dyn ClusterRpc>,
    peer: PeerId,
    block: Block,
    settings: DistributionSettings,
) -> PeerResult {
    let mut attempt = 1;
    loop {
        match rpc.store_block(peer, block.clone()).await {
            Ok(()) => return Ok(peer),
            Err(err) if !err.is_transient() || attempt >= settings.peer_attempts => {
                return Err((peer, err));
            }
            Err(err) => {
                debug!(%peer, cid = %block.cid, attempt, error = %err, "store failed, retrying");
                tokio::time::sleep(settings.retry_backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}

//! In-process cluster: per-peer block stores and a pin log in memory.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use cairn_types::{Block, Cid, PeerId, Pin};
use tokio::sync::RwLock;
use tracing::debug;

use crate::ClusterRpc;
use crate::error::RpcError;

/// Call counters for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    /// `store_block` calls addressed to the peer.
    pub store_calls: usize,
    /// Calls that were acknowledged.
    pub stored: usize,
}

/// A cluster living in the current process.
///
/// Peers are ranked in the order they were created. Faults can be
/// injected per peer:
/// - *down*: not eligible, every call fails.
/// - *broken*: still reported eligible, every store fails.
/// - *flaky*: the next `n` stores fail, later ones succeed.
pub struct LocalCluster {
    peers: Vec<PeerId>,
    stores: RwLock<HashMap<PeerId, HashMap<Cid, Bytes>>>,
    stats: RwLock<HashMap<PeerId, PeerStats>>,
    down: RwLock<HashSet<PeerId>>,
    broken: RwLock<HashSet<PeerId>>,
    flaky: RwLock<HashMap<PeerId, u32>>,
    pins: RwLock<Vec<Pin>>,
    pin_failure: RwLock<Option<String>>,
    store_latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    eligible_calls: AtomicUsize,
}

impl LocalCluster {
    /// Create a cluster of `n` peers with deterministic IDs.
    pub fn new(n: usize) -> Self {
        let peers = (0..n)
            .map(|i| PeerId::from_data(format!("local-peer-{i}").as_bytes()))
            .collect();
        Self::with_peers(peers)
    }

    /// Create a cluster over the given peers, ranked in order.
    pub fn with_peers(peers: Vec<PeerId>) -> Self {
        let stores = peers.iter().map(|p| (*p, HashMap::new())).collect();
        Self {
            peers,
            stores: RwLock::new(stores),
            stats: RwLock::new(HashMap::new()),
            down: RwLock::new(HashSet::new()),
            broken: RwLock::new(HashSet::new()),
            flaky: RwLock::new(HashMap::new()),
            pins: RwLock::new(Vec::new()),
            pin_failure: RwLock::new(None),
            store_latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            eligible_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every store by `latency`.
    pub fn with_store_latency(mut self, latency: Duration) -> Self {
        self.store_latency = Some(latency);
        self
    }

    /// All peers, in rank order.
    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    /// Mark a peer down: ineligible and unreachable.
    pub async fn set_down(&self, peer: PeerId, down: bool) {
        let mut set = self.down.write().await;
        if down {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }

    /// Keep a peer eligible but fail every store sent to it.
    pub async fn set_broken(&self, peer: PeerId, broken: bool) {
        let mut set = self.broken.write().await;
        if broken {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }

    /// Fail the next `failures` stores sent to `peer`.
    pub async fn set_flaky(&self, peer: PeerId, failures: u32) {
        self.flaky.write().await.insert(peer, failures);
    }

    /// Make the next pin commits fail with `reason`, or succeed again.
    pub async fn fail_pins(&self, reason: Option<String>) {
        *self.pin_failure.write().await = reason;
    }

    /// Whether `peer` holds `cid`.
    pub async fn has_block(&self, peer: &PeerId, cid: &Cid) -> bool {
        self.stores
            .read()
            .await
            .get(peer)
            .is_some_and(|s| s.contains_key(cid))
    }

    /// A block stored on `peer`, if any.
    pub async fn get_block(&self, peer: &PeerId, cid: &Cid) -> Option<Block> {
        let stores = self.stores.read().await;
        let data = stores.get(peer)?.get(cid)?.clone();
        Some(Block { cid: *cid, data })
    }

    /// Every block stored on `peer`.
    pub async fn blocks_on(&self, peer: &PeerId) -> HashMap<Cid, Block> {
        let stores = self.stores.read().await;
        stores
            .get(peer)
            .map(|s| {
                s.iter()
                    .map(|(cid, data)| {
                        let block = Block {
                            cid: *cid,
                            data: data.clone(),
                        };
                        (*cid, block)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Blocks stored, summed over peers.
    pub async fn total_blocks(&self) -> usize {
        let stores = self.stores.read().await;
        stores.values().map(HashMap::len).sum()
    }

    /// Pins committed so far, in commit order.
    pub async fn pins(&self) -> Vec<Pin> {
        self.pins.read().await.clone()
    }

    /// Call counters for `peer`.
    pub async fn stats(&self, peer: &PeerId) -> PeerStats {
        self.stats
            .read()
            .await
            .get(peer)
            .copied()
            .unwrap_or_default()
    }

    /// `store_block` calls across all peers.
    pub async fn total_store_calls(&self) -> usize {
        self.stats.read().await.values().map(|s| s.store_calls).sum()
    }

    /// Highest number of stores observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// `eligible_peers` calls so far.
    pub fn eligible_calls(&self) -> usize {
        self.eligible_calls.load(Ordering::SeqCst)
    }

    async fn check_store(&self, peer: PeerId, block: &Block) -> Result<(), RpcError> {
        if self.down.read().await.contains(&peer) {
            return Err(RpcError::Unreachable {
                peer,
                reason: "peer is down".into(),
            });
        }
        if !self.stores.read().await.contains_key(&peer) {
            return Err(RpcError::Unreachable {
                peer,
                reason: "unknown peer".into(),
            });
        }
        if self.broken.read().await.contains(&peer) {
            return Err(RpcError::Unreachable {
                peer,
                reason: "peer is failing".into(),
            });
        }
        if let Some(remaining) = self.flaky.write().await.get_mut(&peer)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(RpcError::Unreachable {
                peer,
                reason: "transient failure".into(),
            });
        }
        if !block.verify() {
            return Err(RpcError::IntegrityFailure {
                expected: block.cid,
                actual: Cid::from_data(&block.data),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterRpc for LocalCluster {
    async fn store_block(&self, peer: PeerId, block: Block) -> Result<(), RpcError> {
        self.stats.write().await.entry(peer).or_default().store_calls += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.store_latency {
            tokio::time::sleep(latency).await;
        }
        let checked = self.check_store(peer, &block).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        checked?;

        if let Some(store) = self.stores.write().await.get_mut(&peer) {
            store.insert(block.cid, block.data);
        }
        self.stats.write().await.entry(peer).or_default().stored += 1;
        debug!(%peer, cid = %block.cid, "stored block");
        Ok(())
    }

    async fn commit_pin(&self, pin: Pin) -> Result<(), RpcError> {
        if let Some(reason) = self.pin_failure.read().await.clone() {
            return Err(RpcError::PinLedger(reason));
        }
        debug!(cid = %pin.cid, allocations = pin.allocations.len(), "pin committed");
        self.pins.write().await.push(pin);
        Ok(())
    }

    async fn eligible_peers(&self, _min: usize, _max: usize) -> Result<Vec<PeerId>, RpcError> {
        self.eligible_calls.fetch_add(1, Ordering::SeqCst);
        let down = self.down.read().await;
        Ok(self
            .peers
            .iter()
            .filter(|p| !down.contains(p))
            .copied()
            .collect())
    }
}

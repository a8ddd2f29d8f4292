//! Shared test utilities for cairn-adder tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cairn_dag::reader;
use cairn_rpc::{ClusterRpc, LocalCluster, RpcError};
use cairn_types::{AddParams, Block, Cid, Layout, PeerId, Pin};

use crate::adder::{AddSummary, Adder};
use crate::entry::{Entry, MemoryEntries};
use crate::error::AddError;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Small chunks and fast retries so tests build real trees quickly.
pub fn params(min: usize, max: usize) -> AddParams {
    AddParams {
        name: "test".into(),
        chunk_size: 64,
        layout: Layout::Balanced { width: 4 },
        replication_factor_min: min,
        replication_factor_max: max,
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

pub fn cluster(peers: usize) -> Arc<LocalCluster> {
    Arc::new(LocalCluster::new(peers))
}

/// Run one add of `entries` against `cluster`.
pub async fn add(
    cluster: &Arc<LocalCluster>,
    params: AddParams,
    entries: Vec<Entry>,
) -> Result<AddSummary, AddError> {
    Adder::new(cluster.clone(), params)
        .add(MemoryEntries::new(entries))
        .await
}

/// A small tree: `docs/` with two files and a nested directory.
pub fn sample_tree() -> Vec<Entry> {
    vec![
        Entry::dir("docs"),
        Entry::file("docs/readme.md", test_data(300)),
        Entry::dir("docs/img"),
        Entry::file("docs/img/logo.png", test_data(1000)),
        Entry::file("docs/notes.txt", b"short".to_vec()),
    ]
}

/// Union of every block stored anywhere in the cluster.
pub async fn all_blocks(cluster: &LocalCluster) -> HashMap<Cid, Block> {
    let mut merged = HashMap::new();
    for peer in cluster.peers() {
        merged.extend(cluster.blocks_on(peer).await);
    }
    merged
}

/// Assert every block reachable from `root` is held by at least `min` peers.
pub async fn assert_replicated(cluster: &LocalCluster, root: &Cid, min: usize) {
    let blocks = all_blocks(cluster).await;
    let reachable = reader::reachable(&blocks, root).unwrap();
    assert!(!reachable.is_empty());
    for cid in reachable {
        let mut holders = 0;
        for peer in cluster.peers() {
            if cluster.has_block(peer, &cid).await {
                holders += 1;
            }
        }
        assert!(holders >= min, "block {cid} held by {holders} peers, need {min}");
    }
}

/// A [`LocalCluster`] with one slow peer and an optional slow pin ledger.
///
/// Tracks how many stores to the slow peer are in flight at once.
pub struct ThrottledCluster {
    pub inner: Arc<LocalCluster>,
    slow_peer: Option<(PeerId, Duration)>,
    pin_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ThrottledCluster {
    pub fn new(inner: Arc<LocalCluster>) -> Self {
        Self {
            inner,
            slow_peer: None,
            pin_delay: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_slow_peer(mut self, peer: PeerId, latency: Duration) -> Self {
        self.slow_peer = Some((peer, latency));
        self
    }

    pub fn with_pin_delay(mut self, delay: Duration) -> Self {
        self.pin_delay = Some(delay);
        self
    }

    /// Highest number of stores in flight to the slow peer.
    pub fn slow_peer_peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClusterRpc for ThrottledCluster {
    async fn store_block(&self, peer: PeerId, block: Block) -> Result<(), RpcError> {
        match self.slow_peer {
            Some((slow, latency)) if slow == peer => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(latency).await;
                let result = self.inner.store_block(peer, block).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            }
            _ => self.inner.store_block(peer, block).await,
        }
    }

    async fn commit_pin(&self, pin: Pin) -> Result<(), RpcError> {
        if let Some(delay) = self.pin_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.commit_pin(pin).await
    }

    async fn eligible_peers(&self, min: usize, max: usize) -> Result<Vec<PeerId>, RpcError> {
        self.inner.eligible_peers(min, max).await
    }
}

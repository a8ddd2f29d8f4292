//! Ranking eligible peers and selecting a replica set.

use std::collections::HashSet;

use cairn_types::PeerId;
use tracing::debug;

use crate::error::PlacementError;

/// Peers selected for one DAG, plus the ranked fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    peers: Vec<PeerId>,
    standby: Vec<PeerId>,
    min: usize,
}

impl Allocation {
    /// Allocated peers in rank order. Between `min` and `max` long.
    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    /// Eligible peers that were not selected, in rank order.
    pub fn standby(&self) -> &[PeerId] {
        &self.standby
    }

    /// Acknowledgements a block needs to count as stored.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Allocated peers, then standby peers, in rank order.
    pub fn ranked(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter().chain(&self.standby)
    }

    /// Next standby candidate not in `tried`.
    ///
    /// Used to narrow a single block's placement after a peer failure; the
    /// allocation itself is never changed.
    pub fn fallback(&self, tried: &HashSet<PeerId>) -> Option<PeerId> {
        self.standby.iter().find(|p| !tried.contains(p)).copied()
    }
}

/// Selects replica sets from the peers a candidate provider reports.
///
/// Ranking: user-requested peers come first when they are eligible, then
/// the remaining candidates in provider order. Duplicates are dropped.
#[derive(Debug, Clone, Default)]
pub struct Allocator {
    preferred: Vec<PeerId>,
}

impl Allocator {
    /// Create an allocator without preferred peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that ranks `preferred` peers first.
    pub fn with_preferred(preferred: Vec<PeerId>) -> Self {
        Self { preferred }
    }

    /// Rank `eligible` and select up to `max` of them, requiring `min`.
    pub fn allocate(
        &self,
        eligible: &[PeerId],
        min: usize,
        max: usize,
    ) -> Result<Allocation, PlacementError> {
        if min == 0 || min > max {
            return Err(PlacementError::InvalidBounds { min, max });
        }

        let ranked = self.rank(eligible);
        if ranked.len() < min {
            return Err(PlacementError::InsufficientReplicas {
                needed: min,
                available: ranked.len(),
            });
        }

        let take = max.min(ranked.len());
        let mut peers = ranked;
        let standby = peers.split_off(take);

        debug!(
            allocated = peers.len(),
            standby = standby.len(),
            min,
            max,
            "allocated peers"
        );

        Ok(Allocation {
            peers,
            standby,
            min,
        })
    }

    fn rank(&self, eligible: &[PeerId]) -> Vec<PeerId> {
        let available: HashSet<&PeerId> = eligible.iter().collect();
        let mut seen = HashSet::with_capacity(eligible.len());
        let mut ranked = Vec::with_capacity(eligible.len());

        let preferred = self.preferred.iter().filter(|p| available.contains(p));
        for peer in preferred.chain(eligible.iter()) {
            if seen.insert(*peer) {
                ranked.push(*peer);
            }
        }
        ranked
    }
}

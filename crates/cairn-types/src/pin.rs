//! Records produced by an add operation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Cid, PeerId};

/// A request to the cluster to retain the DAG rooted at `cid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Root of the pinned DAG.
    pub cid: Cid,
    /// Human readable name.
    pub name: String,
    /// Minimum peers that must hold the DAG.
    pub replication_factor_min: usize,
    /// Maximum peers that may hold the DAG.
    pub replication_factor_max: usize,
    /// Peers the DAG was allocated to.
    pub allocations: Vec<PeerId>,
    /// User-supplied metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Progress event emitted when a file or directory has been finalised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedOutput {
    /// Entry path as received (empty for an implicit wrapping directory).
    pub name: String,
    /// Root CID of the entry.
    pub cid: Cid,
    /// Cumulative encoded size of the entry's DAG.
    pub size: u64,
}

/// Lifecycle of one add operation.
///
/// `Started → Walking → DagBuilt → Distributed → Pinned`, with `Failed`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddState {
    /// Created, nothing read yet.
    Started,
    /// Reading entries and emitting blocks.
    Walking,
    /// Every node of the DAG has been built and emitted.
    DagBuilt,
    /// Every block reached its minimum acknowledgements.
    Distributed,
    /// The pin was committed. Terminal.
    Pinned,
    /// The operation aborted. Terminal.
    Failed,
}

impl AddState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AddState::Pinned | AddState::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: AddState) -> bool {
        use AddState::*;
        match (self, next) {
            (Pinned | Failed, _) => false,
            (_, Failed) => true,
            (Started, Walking)
            | (Walking, DagBuilt)
            | (DagBuilt, Distributed)
            | (Distributed, Pinned) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AddState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddState::Started => "started",
            AddState::Walking => "walking",
            AddState::DagBuilt => "dag-built",
            AddState::Distributed => "distributed",
            AddState::Pinned => "pinned",
            AddState::Failed => "failed",
        };
        f.write_str(s)
    }
}

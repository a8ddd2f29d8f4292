//! Add-operation parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// Default chunk size in bytes (256 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 262_144;

/// Default maximum number of links per internal file node.
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Default number of same-depth subtrees per trickle layer.
pub const DEFAULT_LAYER_REPEAT: usize = 4;

/// Default encoded-size threshold above which directories are sharded.
pub const DEFAULT_SHARD_SIZE: usize = 262_144;

/// Default bits of the name hash consumed per shard level (256 buckets).
pub const DEFAULT_SHARD_FANOUT_BITS: u8 = 8;

/// Largest chunk size accepted by [`AddParams::validate`] (4 MiB).
const MAX_CHUNK_SIZE: u32 = 4 * 1024 * 1024;

/// Strategy for composing a file's leaves into a single root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Layout {
    /// Every `width` nodes on a level are wrapped into one parent.
    Balanced {
        /// Links per internal node.
        width: usize,
    },
    /// `direct` leaves under each node, then subtrees of growing depth.
    Trickle {
        /// Leaves placed directly under every trickle node.
        direct: usize,
        /// Subtrees of each depth before moving to the next depth.
        layer_repeat: usize,
    },
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Balanced {
            width: DEFAULT_MAX_LINKS,
        }
    }
}

impl Layout {
    /// Trickle layout with default parameters.
    pub fn trickle() -> Self {
        Layout::Trickle {
            direct: DEFAULT_MAX_LINKS,
            layer_repeat: DEFAULT_LAYER_REPEAT,
        }
    }
}

/// Limit beyond which a directory is rewritten as a sharded tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardThreshold {
    /// Shard when the directory holds more than this many entries.
    Entries(usize),
    /// Shard when the flat directory encoding would exceed this many bytes.
    EncodedSize(usize),
}

impl Default for ShardThreshold {
    fn default() -> Self {
        ShardThreshold::EncodedSize(DEFAULT_SHARD_SIZE)
    }
}

impl ShardThreshold {
    /// Whether a directory with `entries` entries and a flat encoding of
    /// `encoded_size` bytes exceeds the threshold.
    pub fn exceeded(&self, entries: usize, encoded_size: usize) -> bool {
        match *self {
            ShardThreshold::Entries(limit) => entries > limit,
            ShardThreshold::EncodedSize(limit) => encoded_size > limit,
        }
    }
}

/// Invalid add parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    /// Replication bounds are inconsistent.
    #[error("invalid replication factors: min={min}, max={max}")]
    Replication {
        /// Requested minimum.
        min: usize,
        /// Requested maximum.
        max: usize,
    },

    /// Chunk size is zero or too large.
    #[error("invalid chunk size {0}")]
    ChunkSize(u32),

    /// Layout parameters are out of range.
    #[error("invalid layout: {0}")]
    Layout(String),

    /// Shard fanout is out of range.
    #[error("invalid shard fanout bits {0} (expected 1..=16)")]
    ShardFanout(u8),

    /// Distribution tuning is out of range.
    #[error("invalid distribution setting: {0}")]
    Distribution(String),
}

/// Parameters of one add operation. Fixed for the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddParams {
    /// Human readable name recorded on the pin.
    pub name: String,
    /// DAG layout for file content.
    pub layout: Layout,
    /// Chunk size in bytes.
    pub chunk_size: u32,
    /// Directory sharding threshold.
    pub shard_threshold: ShardThreshold,
    /// Bits of the name hash consumed per shard level.
    pub shard_fanout_bits: u8,
    /// Minimum peers that must hold every block.
    pub replication_factor_min: usize,
    /// Maximum peers that may hold every block.
    pub replication_factor_max: usize,
    /// Wrap the added entries in an enclosing directory.
    pub wrap: bool,
    /// Include hidden files when walking a local path.
    pub hidden: bool,
    /// Peers to prefer when allocating, if they are eligible.
    pub user_allocations: Vec<PeerId>,
    /// Arbitrary metadata recorded on the pin.
    pub metadata: BTreeMap<String, String>,
    /// Blocks allowed in flight to peers at once.
    pub max_outstanding_blocks: usize,
    /// Store attempts per peer before falling back to another candidate.
    pub peer_attempts: u32,
    /// Base delay between attempts against the same peer.
    pub retry_backoff_ms: u64,
    /// Deadline for the whole operation.
    pub timeout_ms: Option<u64>,
}

impl Default for AddParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            layout: Layout::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            shard_threshold: ShardThreshold::default(),
            shard_fanout_bits: DEFAULT_SHARD_FANOUT_BITS,
            replication_factor_min: 1,
            replication_factor_max: 3,
            wrap: false,
            hidden: false,
            user_allocations: Vec::new(),
            metadata: BTreeMap::new(),
            max_outstanding_blocks: 16,
            peer_attempts: 3,
            retry_backoff_ms: 50,
            timeout_ms: None,
        }
    }
}

impl AddParams {
    /// Check that all fields hold workable values.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let (min, max) = (self.replication_factor_min, self.replication_factor_max);
        if min == 0 || min > max {
            return Err(ParamsError::Replication { min, max });
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ParamsError::ChunkSize(self.chunk_size));
        }

        match self.layout {
            Layout::Balanced { width } if width < 2 => {
                return Err(ParamsError::Layout(format!(
                    "balanced width must be at least 2, got {width}"
                )));
            }
            Layout::Trickle { direct, .. } if direct == 0 => {
                return Err(ParamsError::Layout("trickle direct fanout is 0".into()));
            }
            Layout::Trickle { layer_repeat, .. } if layer_repeat == 0 => {
                return Err(ParamsError::Layout("trickle layer repeat is 0".into()));
            }
            _ => {}
        }

        if self.shard_fanout_bits == 0 || self.shard_fanout_bits > 16 {
            return Err(ParamsError::ShardFanout(self.shard_fanout_bits));
        }

        if self.max_outstanding_blocks == 0 {
            return Err(ParamsError::Distribution(
                "max_outstanding_blocks is 0".into(),
            ));
        }
        if self.peer_attempts == 0 {
            return Err(ParamsError::Distribution("peer_attempts is 0".into()));
        }

        Ok(())
    }
}

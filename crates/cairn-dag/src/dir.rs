//! Directory nodes and hash-bucketed sharding for large directories.
//!
//! A directory is emitted as one flat [`Node::Directory`] while it stays
//! within its [`ShardThreshold`]. Beyond that its entries are bucketed by
//! the BLAKE3 hash of their name, `fanout_bits` bits per level, and each
//! bucket is finalised recursively under the same threshold.

use std::collections::{BTreeMap, HashSet};

use cairn_types::{DEFAULT_SHARD_FANOUT_BITS, Link, Node, ShardBucket, ShardThreshold};
use tracing::debug;

use crate::error::DagError;
use crate::sink::{NodeSink, seal};

/// Bits available in a name hash.
const HASH_BITS: usize = 256;

/// Sharding parameters shared by every directory of one add operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardConfig {
    pub threshold: ShardThreshold,
    pub fanout_bits: u8,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            threshold: ShardThreshold::default(),
            fanout_bits: DEFAULT_SHARD_FANOUT_BITS,
        }
    }
}

/// Collects the entries of one open directory.
#[derive(Debug, Default)]
pub struct DirectoryBuilder {
    links: Vec<Link>,
    names: HashSet<String>,
}

impl DirectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child. Names must be unique within the directory.
    pub fn add(&mut self, link: Link) -> Result<(), DagError> {
        if !self.names.insert(link.name.clone()) {
            return Err(DagError::DuplicateName(link.name));
        }
        self.links.push(link);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Entries in the order they were added, without building a node.
    pub fn into_links(self) -> Vec<Link> {
        self.links
    }

    /// Finalise the directory, sharding it if it exceeds the threshold.
    ///
    /// The returned link is unnamed; the caller names it when registering
    /// it with the parent.
    pub fn build(self, config: &ShardConfig, sink: &mut dyn NodeSink) -> Result<Link, DagError> {
        build_level(self.links, 0, config, sink)
    }
}

fn build_level(
    links: Vec<Link>,
    depth: usize,
    config: &ShardConfig,
    sink: &mut dyn NodeSink,
) -> Result<Link, DagError> {
    let bits = config.fanout_bits.max(1) as usize;
    let entries = links.len();
    let flat = Node::Directory { links };
    let encoded_size = flat.encode()?.len();

    let can_split = (depth + 1) * bits <= HASH_BITS && (depth == 0 || entries > 1);
    if !config.threshold.exceeded(entries, encoded_size) || !can_split {
        return seal(flat, "", sink);
    }

    let links = match flat {
        Node::Directory { links } => links,
        other => return seal(other, "", sink),
    };

    let mut buckets: BTreeMap<u32, Vec<Link>> = BTreeMap::new();
    for link in links {
        let index = name_bucket(&link.name, depth, bits as u8);
        buckets.entry(index).or_default().push(link);
    }

    debug!(
        depth,
        entries,
        encoded_size,
        buckets = buckets.len(),
        "sharding directory level"
    );

    let mut shard_buckets = Vec::with_capacity(buckets.len());
    for (index, members) in buckets {
        let child = build_level(members, depth + 1, config, sink)?;
        shard_buckets.push(ShardBucket {
            index,
            link: child.renamed(format!("{index:X}")),
        });
    }

    seal(
        Node::Shard {
            fanout_bits: bits as u8,
            depth: depth as u8,
            buckets: shard_buckets,
        },
        "",
        sink,
    )
}

/// Bucket of a name hash at `depth`: bits `[depth*fanout_bits,
/// (depth+1)*fanout_bits)` read big-endian. Bits past the end of the hash
/// read as zero.
pub fn bucket_index(hash: &[u8; 32], depth: usize, fanout_bits: u8) -> u32 {
    let bits = fanout_bits as usize;
    let start = depth * bits;
    (start..start + bits).fold(0u32, |acc, i| {
        let bit = hash.get(i / 8).map_or(0, |byte| (byte >> (7 - i % 8)) & 1);
        (acc << 1) | bit as u32
    })
}

/// Bucket of `name` at `depth`.
pub fn name_bucket(name: &str, depth: usize, fanout_bits: u8) -> u32 {
    bucket_index(blake3::hash(name.as_bytes()).as_bytes(), depth, fanout_bits)
}

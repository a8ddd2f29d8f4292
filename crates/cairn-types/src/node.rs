//! DAG nodes, links and encoded blocks.
//!
//! A [`Node`] is encoded with postcard; the [`Cid`] of a node is the BLAKE3
//! hash of that encoding. postcard output is a pure function of the value,
//! so the same node always yields the same CID.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Cid;

/// A named reference from an internal node to a child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Entry name. Empty for the chunk links of a file node.
    pub name: String,
    /// CID of the child node.
    pub cid: Cid,
    /// Cumulative encoded size of the child subtree in bytes.
    pub size: u64,
}

impl Link {
    /// Create a link.
    pub fn new(name: impl Into<String>, cid: Cid, size: u64) -> Self {
        Self {
            name: name.into(),
            cid,
            size,
        }
    }

    /// Return a copy of this link carrying a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cid: self.cid,
            size: self.size,
        }
    }
}

/// One non-empty bucket of a sharded directory level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardBucket {
    /// Bucket index in `0..2^fanout_bits`.
    pub index: u32,
    /// Link to the bucket's directory (or deeper shard) node.
    pub link: Link,
}

/// A content-addressed DAG node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Leaf wrapping exactly one chunk of file data.
    Raw(Vec<u8>),
    /// Internal file node. Links are ordered and unnamed.
    File {
        /// Ordered child links.
        links: Vec<Link>,
        /// Total file content bytes reachable from this node.
        file_size: u64,
    },
    /// Flat directory listing entries in the order they were received.
    Directory {
        /// Named child links.
        links: Vec<Link>,
    },
    /// One level of a sharded directory.
    Shard {
        /// Bits of the name hash consumed per level.
        fanout_bits: u8,
        /// Level of this node (0 for the top of the shard tree).
        depth: u8,
        /// Non-empty buckets, ascending by index.
        buckets: Vec<ShardBucket>,
    },
}

/// Errors encoding or decoding nodes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Node {
    /// The leaf produced for a zero-byte file.
    pub fn empty_leaf() -> Self {
        Node::Raw(Vec::new())
    }

    /// An empty flat directory.
    pub fn empty_directory() -> Self {
        Node::Directory { links: Vec::new() }
    }

    /// Encode to the canonical postcard bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(self).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Decode from canonical postcard bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Compute the node's CID.
    pub fn cid(&self) -> Result<Cid, CodecError> {
        Ok(Cid::from_data(&self.encode()?))
    }

    /// Encode into a [`Block`] ready to be stored on peers.
    pub fn to_block(&self) -> Result<Block, CodecError> {
        let data = self.encode()?;
        Ok(Block {
            cid: Cid::from_data(&data),
            data: Bytes::from(data),
        })
    }

    /// Every child link, in encoding order.
    pub fn links(&self) -> Vec<&Link> {
        match self {
            Node::Raw(_) => Vec::new(),
            Node::File { links, .. } | Node::Directory { links } => links.iter().collect(),
            Node::Shard { buckets, .. } => buckets.iter().map(|b| &b.link).collect(),
        }
    }

    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Raw(_))
    }

    /// Whether this node is a flat directory or a shard level.
    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory { .. } | Node::Shard { .. })
    }

    /// File content bytes reachable from this node (0 for directories).
    pub fn content_size(&self) -> u64 {
        match self {
            Node::Raw(data) => data.len() as u64,
            Node::File { file_size, .. } => *file_size,
            _ => 0,
        }
    }
}

/// An encoded node together with its CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// `blake3(data)`.
    pub cid: Cid,
    /// Canonical node encoding.
    pub data: Bytes,
}

impl Block {
    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the encoding is empty (never true for a valid node).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the node carried by this block.
    pub fn node(&self) -> Result<Node, CodecError> {
        Node::decode(&self.data)
    }

    /// Re-hash the data and compare against the CID.
    pub fn verify(&self) -> bool {
        Cid::from_data(&self.data) == self.cid
    }
}

//! Error types for DAG building.

use cairn_types::{Cid, CodecError};

/// Errors that can occur while building or reading a DAG.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A node could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Reading file content failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Two entries of one directory share a name.
    #[error("duplicate entry name {0:?}")]
    DuplicateName(String),

    /// A layout was finished without any leaf.
    #[error("layout finished without leaves")]
    EmptyLayout,

    /// A block referenced by the DAG is not available.
    #[error("block not found: {0}")]
    MissingBlock(Cid),

    /// A lookup reached a node that is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(Cid),

    /// A file read reached a directory node.
    #[error("not a file: {0}")]
    NotAFile(Cid),
}

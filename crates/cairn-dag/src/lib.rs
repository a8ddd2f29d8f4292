//! Merkle DAG construction for cairn.
//!
//! This crate turns file content and directory listings into
//! content-addressed nodes:
//! - [`Chunker`] cuts a byte stream into fixed-size chunks.
//! - [`FileBuilder`] composes chunks into a file DAG under a [`Layout`]
//!   (balanced or trickle).
//! - [`DirectoryBuilder`] finalises a directory, sharding it by name hash
//!   once it exceeds its threshold.
//! - [`reader`] walks emitted DAGs (lookup by name, listings, reachability).
//!
//! Builders never buffer the DAG: every node is handed to a [`NodeSink`]
//! the moment its CID is known.
//!
//! [`Layout`]: cairn_types::Layout

mod chunker;
mod dir;
mod error;
pub mod layout;
pub mod reader;
mod sink;

pub use chunker::{Chunk, ChunkStream, Chunker};
pub use dir::{DirectoryBuilder, ShardConfig, bucket_index, name_bucket};
pub use error::DagError;
pub use layout::{BalancedBuilder, FileBuilder, LayoutBuilder, TrickleBuilder};
pub use sink::{BlockSource, Child, NodeSink};

//! Emission seam between the builders and whoever ships blocks.

use std::collections::{BTreeMap, HashMap};

use cairn_types::{Block, Cid, Link, Node};

use crate::error::DagError;

/// Receives every node the moment it is finalised.
///
/// Builders never hold on to emitted blocks; the sink decides whether to
/// buffer, forward or drop them.
pub trait NodeSink {
    /// Accept one finalised block.
    fn emit(&mut self, block: Block);
}

impl NodeSink for Vec<Block> {
    fn emit(&mut self, block: Block) {
        self.push(block);
    }
}

impl NodeSink for HashMap<Cid, Block> {
    fn emit(&mut self, block: Block) {
        self.insert(block.cid, block);
    }
}

/// Read access to previously emitted blocks.
pub trait BlockSource {
    /// Fetch a block by CID.
    fn get_block(&self, cid: &Cid) -> Option<&Block>;

    /// Fetch and decode a node, failing if it is missing.
    fn get_node(&self, cid: &Cid) -> Result<Node, DagError> {
        let block = self.get_block(cid).ok_or(DagError::MissingBlock(*cid))?;
        Ok(block.node()?)
    }
}

impl BlockSource for HashMap<Cid, Block> {
    fn get_block(&self, cid: &Cid) -> Option<&Block> {
        self.get(cid)
    }
}

impl BlockSource for BTreeMap<Cid, Block> {
    fn get_block(&self, cid: &Cid) -> Option<&Block> {
        self.get(cid)
    }
}

/// A finalised child together with the file content bytes beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    /// Link to the child node.
    pub link: Link,
    /// File content bytes reachable from the child.
    pub content: u64,
}

/// Encode `node`, hand it to the sink and return a link to it.
///
/// The link size is the block length plus the sizes of all child links.
pub(crate) fn seal(node: Node, name: &str, sink: &mut dyn NodeSink) -> Result<Link, DagError> {
    let child_size: u64 = node.links().iter().map(|l| l.size).sum();
    let block = node.to_block()?;
    let link = Link::new(name, block.cid, block.len() as u64 + child_size);
    sink.emit(block);
    Ok(link)
}

/// Seal a file node over `children`.
pub(crate) fn seal_file(children: Vec<Child>, sink: &mut dyn NodeSink) -> Result<Child, DagError> {
    let file_size = children.iter().map(|c| c.content).sum();
    let links = children.into_iter().map(|c| c.link).collect();
    let link = seal(Node::File { links, file_size }, "", sink)?;
    Ok(Child {
        link,
        content: file_size,
    })
}

//! Trickle layout, tuned for sequential reads and appends.
//!
//! Every trickle node takes `direct` leaves first, then `layer_repeat`
//! subtrees of depth 1, then `layer_repeat` of depth 2, and so on. A
//! subtree of depth `d` is itself a trickle node whose subtrees stop at
//! depth `d - 1`. The root has no depth bound.

use tracing::trace;

use super::LayoutBuilder;
use crate::error::DagError;
use crate::sink::{Child, NodeSink, seal_file};

/// One open trickle node.
struct Frame {
    /// Depth this node may reach. `None` for the root.
    max_depth: Option<usize>,
    children: Vec<Child>,
    leaves: usize,
    /// Depth of the subtree currently being filled.
    sub_depth: usize,
    /// Subtrees already completed at `sub_depth`.
    sub_count: usize,
}

impl Frame {
    fn new(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            children: Vec::new(),
            leaves: 0,
            sub_depth: 1,
            sub_count: 0,
        }
    }
}

pub struct TrickleBuilder {
    direct: usize,
    layer_repeat: usize,
    stack: Vec<Frame>,
}

impl TrickleBuilder {
    pub fn new(direct: usize, layer_repeat: usize) -> Self {
        Self {
            direct: direct.max(1),
            layer_repeat: layer_repeat.max(1),
            stack: vec![Frame::new(None)],
        }
    }

    fn is_full(&self, frame: &Frame) -> bool {
        match frame.max_depth {
            Some(max) => frame.leaves == self.direct && frame.sub_depth >= max,
            None => false,
        }
    }

    /// Seal the top frame and hand it to its parent.
    fn close_top(&mut self, sink: &mut dyn NodeSink) -> Result<(), DagError> {
        let frame = self.stack.pop().ok_or(DagError::EmptyLayout)?;
        let node = seal_file(frame.children, sink)?;
        trace!(depth = ?frame.max_depth, cid = %node.link.cid, "sealed trickle subtree");

        let layer_repeat = self.layer_repeat;
        let parent = self.stack.last_mut().ok_or(DagError::EmptyLayout)?;
        parent.children.push(node);
        parent.sub_count += 1;
        if parent.sub_count == layer_repeat {
            parent.sub_depth += 1;
            parent.sub_count = 0;
        }
        Ok(())
    }
}

impl LayoutBuilder for TrickleBuilder {
    fn push(&mut self, leaf: Child, sink: &mut dyn NodeSink) -> Result<(), DagError> {
        loop {
            let direct = self.direct;
            let top = self.stack.last_mut().ok_or(DagError::EmptyLayout)?;
            if top.leaves < direct {
                top.children.push(leaf);
                top.leaves += 1;
                break;
            }
            let depth = top.sub_depth;
            self.stack.push(Frame::new(Some(depth)));
        }

        while self.stack.len() > 1 {
            let full = match self.stack.last() {
                Some(top) => self.is_full(top),
                None => false,
            };
            if !full {
                break;
            }
            self.close_top(sink)?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, sink: &mut dyn NodeSink) -> Result<Child, DagError> {
        while self.stack.len() > 1 {
            self.close_top(sink)?;
        }

        let mut root = self.stack.pop().ok_or(DagError::EmptyLayout)?;
        match root.children.len() {
            0 => Err(DagError::EmptyLayout),
            1 if root.leaves == 1 => root.children.pop().ok_or(DagError::EmptyLayout),
            _ => seal_file(root.children, sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cairn_types::{Block, Cid, Layout, Node};

    use super::*;
    use crate::chunker::Chunker;
    use crate::layout::FileBuilder;
    use crate::sink::BlockSource;

    fn build(direct: usize, layer_repeat: usize, leaves: usize) -> (Child, HashMap<Cid, Block>) {
        // Distinct leaves so the root's direct links can be told apart.
        let data: Vec<u8> = (0..leaves as u32).flat_map(|i| i.to_be_bytes()).collect();
        let chunks = Chunker::new(4).chunk(&data);
        let mut blocks = HashMap::new();
        let layout = Layout::Trickle {
            direct,
            layer_repeat,
        };
        let root = FileBuilder::build(layout, chunks, &mut blocks).unwrap();
        (root, blocks)
    }

    fn file_links(blocks: &HashMap<Cid, Block>, cid: &Cid) -> Vec<Cid> {
        match blocks.get_node(cid).unwrap() {
            Node::File { links, .. } => links.iter().map(|l| l.cid).collect(),
            other => panic!("expected file node, got {other:?}"),
        }
    }

    fn max_depth(blocks: &HashMap<Cid, Block>, cid: &Cid) -> usize {
        match blocks.get_node(cid).unwrap() {
            Node::Raw(_) => 0,
            Node::File { links, .. } => {
                1 + links
                    .iter()
                    .map(|l| max_depth(blocks, &l.cid))
                    .max()
                    .unwrap_or(0)
            }
            other => panic!("unexpected node in file: {other:?}"),
        }
    }

    fn leaf_cid(i: u32) -> Cid {
        Node::Raw(i.to_be_bytes().to_vec()).cid().unwrap()
    }

    #[test]
    fn test_first_direct_leaves_hang_off_root() {
        let (root, blocks) = build(3, 2, 20);
        let links = file_links(&blocks, &root.link.cid);
        assert_eq!(&links[..3], &[leaf_cid(0), leaf_cid(1), leaf_cid(2)]);
        assert_eq!(root.content, 80);
    }

    #[test]
    fn test_subtree_schedule() {
        // direct=2, repeat=2: root gets 2 leaves, then two depth-1
        // subtrees of 2 leaves each, then depth-2 subtrees of
        // 2 + 2*2 = 6 leaves each.
        let (root, blocks) = build(2, 2, 2 + 2 * 2 + 6);
        let links = file_links(&blocks, &root.link.cid);
        assert_eq!(links.len(), 2 + 2 + 1);

        let depth1 = file_links(&blocks, &links[2]);
        assert_eq!(depth1, vec![leaf_cid(2), leaf_cid(3)]);
        assert_eq!(max_depth(&blocks, &links[3]), 1);

        let depth2 = file_links(&blocks, &links[4]);
        assert_eq!(depth2.len(), 2 + 2);
        assert_eq!(&depth2[..2], &[leaf_cid(6), leaf_cid(7)]);
        assert_eq!(max_depth(&blocks, &links[4]), 2);
    }

    #[test]
    fn test_direct_only_file_is_flat() {
        let (root, blocks) = build(8, 4, 5);
        assert_eq!(file_links(&blocks, &root.link.cid).len(), 5);
        assert_eq!(max_depth(&blocks, &root.link.cid), 1);
    }

    #[test]
    fn test_partial_subtree_is_flushed() {
        let (root, blocks) = build(2, 2, 3);
        let links = file_links(&blocks, &root.link.cid);
        assert_eq!(links.len(), 3);
        assert_eq!(file_links(&blocks, &links[2]), vec![leaf_cid(2)]);
    }

    #[test]
    fn test_deterministic() {
        let (a, _) = build(3, 2, 50);
        let (b, _) = build(3, 2, 50);
        assert_eq!(a, b);
    }
}

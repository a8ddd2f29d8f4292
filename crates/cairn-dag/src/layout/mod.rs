//! File layouts: how leaves compose into a single root.
//!
//! Both layouts are push-driven. Leaves arrive one at a time and every
//! internal node is sealed and emitted as soon as its group is complete, so
//! a file never has to be held in memory as a whole.

mod balanced;
mod trickle;

pub use balanced::BalancedBuilder;
pub use trickle::TrickleBuilder;

use cairn_types::{Layout, Node};

use crate::chunker::Chunk;
use crate::error::DagError;
use crate::sink::{Child, NodeSink, seal};

/// A strategy assembling leaves into a DAG.
pub trait LayoutBuilder: Send {
    /// Append the next leaf.
    fn push(&mut self, leaf: Child, sink: &mut dyn NodeSink) -> Result<(), DagError>;

    /// Flush partial groups and return the root.
    fn finish(self: Box<Self>, sink: &mut dyn NodeSink) -> Result<Child, DagError>;
}

/// Create the builder for a layout.
pub fn builder_for(layout: Layout) -> Box<dyn LayoutBuilder> {
    match layout {
        Layout::Balanced { width } => Box::new(BalancedBuilder::new(width)),
        Layout::Trickle {
            direct,
            layer_repeat,
        } => Box::new(TrickleBuilder::new(direct, layer_repeat)),
    }
}

/// Turns one file's chunks into a DAG under a fixed layout.
pub struct FileBuilder {
    layout: Box<dyn LayoutBuilder>,
    leaves: usize,
}

impl FileBuilder {
    /// Start a file.
    pub fn new(layout: Layout) -> Self {
        Self {
            layout: builder_for(layout),
            leaves: 0,
        }
    }

    /// Seal `chunk` as a leaf and feed it to the layout.
    pub fn push_chunk(&mut self, chunk: Chunk, sink: &mut dyn NodeSink) -> Result<(), DagError> {
        let content = chunk.data.len() as u64;
        let link = seal(Node::Raw(chunk.data), "", sink)?;
        self.leaves += 1;
        self.layout.push(Child { link, content }, sink)
    }

    /// Number of leaves pushed so far.
    pub fn leaves(&self) -> usize {
        self.leaves
    }

    /// Finish the file and return its root.
    ///
    /// A file that received no chunk at all gets the canonical empty leaf.
    pub fn finish(mut self, sink: &mut dyn NodeSink) -> Result<Child, DagError> {
        if self.leaves == 0 {
            self.push_chunk(
                Chunk {
                    offset: 0,
                    data: Vec::new(),
                },
                sink,
            )?;
        }
        self.layout.finish(sink)
    }

    /// Build a whole in-memory buffer.
    pub fn build(
        layout: Layout,
        chunks: Vec<Chunk>,
        sink: &mut dyn NodeSink,
    ) -> Result<Child, DagError> {
        let mut builder = Self::new(layout);
        for chunk in chunks {
            builder.push_chunk(chunk, sink)?;
        }
        builder.finish(sink)
    }
}

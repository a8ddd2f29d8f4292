//! Balanced layout: every leaf sits at the same depth.

use tracing::trace;

use super::LayoutBuilder;
use crate::error::DagError;
use crate::sink::{Child, NodeSink, seal_file};

/// Groups every `width` nodes on a level under one parent.
///
/// `levels[0]` holds pending leaves, `levels[n]` pending nodes of height
/// `n`. A level is sealed the moment it reaches `width` entries.
pub struct BalancedBuilder {
    width: usize,
    levels: Vec<Vec<Child>>,
}

impl BalancedBuilder {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(2),
            levels: Vec::new(),
        }
    }

    fn push_at(
        &mut self,
        level: usize,
        child: Child,
        sink: &mut dyn NodeSink,
    ) -> Result<(), DagError> {
        if self.levels.len() <= level {
            self.levels.push(Vec::with_capacity(self.width));
        }
        self.levels[level].push(child);

        if self.levels[level].len() == self.width {
            let group = std::mem::take(&mut self.levels[level]);
            let parent = seal_file(group, sink)?;
            trace!(level = level + 1, cid = %parent.link.cid, "sealed balanced node");
            self.push_at(level + 1, parent, sink)?;
        }
        Ok(())
    }
}

impl LayoutBuilder for BalancedBuilder {
    fn push(&mut self, leaf: Child, sink: &mut dyn NodeSink) -> Result<(), DagError> {
        self.push_at(0, leaf, sink)
    }

    fn finish(mut self: Box<Self>, sink: &mut dyn NodeSink) -> Result<Child, DagError> {
        let mut level = 0;
        while level < self.levels.len() {
            let top = level + 1 == self.levels.len();
            let pending = std::mem::take(&mut self.levels[level]);
            match pending.len() {
                0 => {}
                1 if top => {
                    return pending.into_iter().next().ok_or(DagError::EmptyLayout);
                }
                _ => {
                    let parent = seal_file(pending, sink)?;
                    self.push_at(level + 1, parent, sink)?;
                }
            }
            level += 1;
        }
        Err(DagError::EmptyLayout)
    }
}

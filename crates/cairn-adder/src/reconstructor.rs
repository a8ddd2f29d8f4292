//! Rebuilds the directory tree from the flattened entry stream.

use cairn_dag::{Chunker, DagError, DirectoryBuilder, FileBuilder, ShardConfig};
use cairn_types::{AddParams, AddedOutput, Block, Layout, Link};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::debug;

use crate::entry::{Entry, EntryKind};
use crate::error::AddError;

/// Static settings of one reconstruction.
#[derive(Debug, Clone, Copy)]
pub struct ReconstructorConfig {
    pub layout: Layout,
    pub chunk_size: u32,
    pub shard: ShardConfig,
    pub wrap: bool,
}

impl From<&AddParams> for ReconstructorConfig {
    fn from(params: &AddParams) -> Self {
        Self {
            layout: params.layout,
            chunk_size: params.chunk_size,
            shard: ShardConfig {
                threshold: params.shard_threshold,
                fanout_bits: params.shard_fanout_bits,
            },
            wrap: params.wrap,
        }
    }
}

/// A directory that is still receiving entries.
struct OpenDir {
    /// Full path; empty for the enclosing directory.
    path: String,
    /// Name under the parent.
    name: String,
    builder: DirectoryBuilder,
}

/// Drives the file and directory builders over an ordered entry stream.
///
/// `stack[0]` is the enclosing directory of the whole operation; deeper
/// slots are the directories currently open, outermost first. Finalised
/// blocks are collected in `outbox` and drained into the block channel
/// after every step, so the channel capacity bounds how far building can
/// run ahead of distribution.
pub struct TreeReconstructor {
    config: ReconstructorConfig,
    chunker: Chunker,
    stack: Vec<OpenDir>,
    outbox: Vec<Block>,
    blocks: mpsc::Sender<Block>,
    outputs: Option<mpsc::UnboundedSender<AddedOutput>>,
    emitted: usize,
}

impl TreeReconstructor {
    pub fn new(config: ReconstructorConfig, blocks: mpsc::Sender<Block>) -> Self {
        Self {
            chunker: Chunker::new(config.chunk_size),
            config,
            stack: vec![OpenDir {
                path: String::new(),
                name: String::new(),
                builder: DirectoryBuilder::new(),
            }],
            outbox: Vec::new(),
            blocks,
            outputs: None,
            emitted: 0,
        }
    }

    /// Report every finalised file and directory on `outputs`.
    pub fn with_outputs(mut self, outputs: mpsc::UnboundedSender<AddedOutput>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Blocks handed to the channel so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Consume one entry.
    pub async fn push(&mut self, entry: Entry) -> Result<(), AddError> {
        let (parent, name) = split_path(&entry.path)?;
        self.close_until(parent).await?;

        let top = self.top()?;
        if top.path != parent {
            return Err(AddError::malformed(
                &entry.path,
                format!("parent {parent:?} is not an open directory"),
            ));
        }
        if top.builder.contains(name) {
            return Err(AddError::malformed(&entry.path, "duplicate entry name"));
        }

        match entry.kind {
            EntryKind::Directory => {
                if entry.content.is_some() {
                    return Err(AddError::malformed(&entry.path, "directory carries content"));
                }
                debug!(path = %entry.path, "opening directory");
                self.stack.push(OpenDir {
                    name: name.to_string(),
                    path: entry.path,
                    builder: DirectoryBuilder::new(),
                });
            }
            EntryKind::File => {
                let link = match entry.content {
                    Some(reader) => self.add_file(&entry.path, reader).await?,
                    None => self.add_file(&entry.path, tokio::io::empty()).await?,
                };
                let name = name.to_string();
                self.register(&entry.path, link.renamed(name))?;
            }
        }
        Ok(())
    }

    /// Close every open directory and return the root.
    ///
    /// With `wrap` off and exactly one top-level entry, that entry is the
    /// root and the enclosing directory is never emitted.
    pub async fn finish(mut self) -> Result<Link, AddError> {
        while self.stack.len() > 1 {
            self.close_top().await?;
        }
        let enclosing = self.stack.pop().ok_or(DagError::EmptyLayout)?;

        if !self.config.wrap && enclosing.builder.len() == 1 {
            let mut entries = enclosing.builder.into_links();
            let root = entries.pop().ok_or(DagError::EmptyLayout)?;
            debug!(cid = %root.cid, name = %root.name, "single top-level entry is the root");
            return Ok(root);
        }

        let root = enclosing
            .builder
            .build(&self.config.shard, &mut self.outbox)?;
        self.flush().await?;
        self.report("", &root);
        Ok(root)
    }

    async fn add_file<R>(&mut self, path: &str, reader: R) -> Result<Link, AddError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunks = self.chunker.stream(reader);
        let mut file = FileBuilder::new(self.config.layout);
        while let Some(chunk) = chunks.next_chunk().await? {
            file.push_chunk(chunk, &mut self.outbox)?;
            self.flush().await?;
        }
        let root = file.finish(&mut self.outbox)?;
        self.flush().await?;

        debug!(path, cid = %root.link.cid, bytes = root.content, "file finalised");
        self.report(path, &root.link);
        Ok(root.link)
    }

    /// Close directories until `parent` is on top, or only the enclosing
    /// directory is left.
    async fn close_until(&mut self, parent: &str) -> Result<(), AddError> {
        while self.stack.len() > 1 {
            let nests = match self.stack.last() {
                Some(top) => top.path == parent,
                None => false,
            };
            if nests {
                break;
            }
            self.close_top().await?;
        }
        Ok(())
    }

    async fn close_top(&mut self) -> Result<(), AddError> {
        let dir = self.stack.pop().ok_or(DagError::EmptyLayout)?;
        let link = dir.builder.build(&self.config.shard, &mut self.outbox)?;
        self.flush().await?;
        debug!(path = %dir.path, cid = %link.cid, "directory finalised");
        self.report(&dir.path, &link);
        self.register(&dir.path, link.renamed(dir.name))
    }

    fn register(&mut self, path: &str, link: Link) -> Result<(), AddError> {
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| AddError::malformed(path, "no open directory"))?;
        top.builder.add(link).map_err(|err| match err {
            DagError::DuplicateName(_) => AddError::malformed(path, "duplicate entry name"),
            other => AddError::Dag(other),
        })
    }

    fn top(&self) -> Result<&OpenDir, AddError> {
        self.stack
            .last()
            .ok_or_else(|| AddError::malformed("", "no open directory"))
    }

    fn report(&self, path: &str, link: &Link) {
        if let Some(outputs) = &self.outputs {
            // A dropped receiver only means nobody is listening.
            let _ = outputs.send(AddedOutput {
                name: path.to_string(),
                cid: link.cid,
                size: link.size,
            });
        }
    }

    async fn flush(&mut self) -> Result<(), AddError> {
        for block in self.outbox.drain(..) {
            self.blocks
                .send(block)
                .await
                .map_err(|_| AddError::DistributorStopped)?;
            self.emitted += 1;
        }
        Ok(())
    }
}

/// Split an entry path into its parent path and final name, rejecting
/// anything that is not a plain relative path.
fn split_path(path: &str) -> Result<(&str, &str), AddError> {
    if path.is_empty() {
        return Err(AddError::malformed(path, "empty path"));
    }
    if path.starts_with('/') {
        return Err(AddError::malformed(path, "absolute path"));
    }
    if path
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(AddError::malformed(path, "invalid path component"));
    }
    Ok(match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    })
}

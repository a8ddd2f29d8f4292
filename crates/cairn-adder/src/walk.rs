//! Entry source walking a local path.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::entry::{Entry, EntrySource};
use crate::error::AddError;

struct Pending {
    rel: String,
    path: PathBuf,
    is_dir: bool,
}

/// Depth-first, pre-order walk of a file or directory.
///
/// The root itself is the first entry, named after its last path
/// component. Siblings are yielded sorted by name so repeated walks of the
/// same tree produce the same stream. Files are opened lazily, one at a
/// time. Anything that is neither a regular file nor a directory is
/// skipped.
pub struct FsWalk {
    root: PathBuf,
    hidden: bool,
    stack: Vec<Pending>,
    started: bool,
}

impl FsWalk {
    /// Walk `root`, skipping dot-files unless `hidden` is set.
    pub fn new(root: impl Into<PathBuf>, hidden: bool) -> Self {
        Self {
            root: root.into(),
            hidden,
            stack: Vec::new(),
            started: false,
        }
    }

    async fn start(&mut self) -> Result<(), AddError> {
        let root = tokio::fs::canonicalize(&self.root).await?;
        let name = file_name(&root)?;
        let meta = tokio::fs::metadata(&root).await?;
        self.stack.push(Pending {
            rel: name,
            is_dir: meta.is_dir(),
            path: root,
        });
        Ok(())
    }

    async fn push_children(&mut self, dir: &Pending) -> Result<(), AddError> {
        let mut children = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir.path).await?;
        while let Some(child) = reader.next_entry().await? {
            let path = child.path();
            let name = file_name(&path)?;
            if !self.hidden && name.starts_with('.') {
                continue;
            }
            let file_type = child.file_type().await?;
            if !file_type.is_dir() && !file_type.is_file() {
                debug!(path = %path.display(), "skipping special file");
                continue;
            }
            children.push(Pending {
                rel: format!("{}/{}", dir.rel, name),
                path,
                is_dir: file_type.is_dir(),
            });
        }

        children.sort_by(|a, b| a.rel.cmp(&b.rel));
        // Reversed so the smallest name is popped first.
        self.stack.extend(children.into_iter().rev());
        Ok(())
    }
}

fn file_name(path: &Path) -> Result<String, AddError> {
    let name = path.file_name().ok_or_else(|| {
        AddError::malformed(&path.display().to_string(), "path has no file name")
    })?;
    name.to_str().map(str::to_string).ok_or_else(|| {
        AddError::malformed(&path.display().to_string(), "file name is not UTF-8")
    })
}

#[async_trait::async_trait]
impl EntrySource for FsWalk {
    async fn next_entry(&mut self) -> Result<Option<Entry>, AddError> {
        if !self.started {
            self.started = true;
            self.start().await?;
        }

        let Some(next) = self.stack.pop() else {
            return Ok(None);
        };

        if next.is_dir {
            self.push_children(&next).await?;
            return Ok(Some(Entry::dir(next.rel)));
        }

        let file = tokio::fs::File::open(&next.path).await?;
        Ok(Some(Entry::file_reader(next.rel, Box::new(file))))
    }
}

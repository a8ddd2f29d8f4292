//! The ordered entry stream an add operation consumes.

use std::collections::VecDeque;
use std::fmt;
use std::io::Cursor;

use tokio::io::AsyncRead;

use crate::error::AddError;

/// Byte stream of one file entry.
pub type EntryReader = Box<dyn AsyncRead + Send + Unpin>;

/// Kind of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One file or directory boundary in the input.
///
/// Paths are relative and `/`-separated. Entries arrive depth-first in
/// pre-order: a directory precedes everything below it, and a directory is
/// closed implicitly by the first entry that does not nest under it.
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    /// File content. `None` for directories and for empty files.
    pub content: Option<EntryReader>,
}

impl Entry {
    /// A file whose content is already in memory.
    pub fn file(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::file_reader(path, Box::new(Cursor::new(data.into())))
    }

    /// A file read from `reader`.
    pub fn file_reader(path: impl Into<String>, reader: EntryReader) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content: Some(reader),
        }
    }

    /// A directory.
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            content: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("content", &self.content.as_ref().map(|_| ".."))
            .finish()
    }
}

/// An ordered, single-pass source of entries.
#[async_trait::async_trait]
pub trait EntrySource: Send {
    /// The next entry, or `None` at the end of the stream.
    async fn next_entry(&mut self) -> Result<Option<Entry>, AddError>;
}

/// Entries held in memory, yielded in order.
#[derive(Debug, Default)]
pub struct MemoryEntries {
    entries: VecDeque<Entry>,
}

impl MemoryEntries {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Entry>> for MemoryEntries {
    fn from(entries: Vec<Entry>) -> Self {
        Self::new(entries)
    }
}

#[async_trait::async_trait]
impl EntrySource for MemoryEntries {
    async fn next_entry(&mut self) -> Result<Option<Entry>, AddError> {
        Ok(self.entries.pop_front())
    }
}

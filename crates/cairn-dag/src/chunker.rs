//! Fixed-size chunker for splitting file content into leaf payloads.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::DagError;

/// A slice of file content, immutable once cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// The raw chunk data.
    pub data: Vec<u8>,
}

/// Fixed-size chunker that splits data into chunks of a configured size.
///
/// The last chunk may be smaller than `chunk_size`. Empty data produces a
/// single empty chunk, so every file has at least one leaf.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: u32,
}

impl Chunker {
    /// Create a new chunker with the given chunk size in bytes.
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Return the configured chunk size.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Split an in-memory buffer into fixed-size chunks.
    pub fn chunk(&self, data: &[u8]) -> Vec<Chunk> {
        if data.is_empty() {
            return vec![Chunk {
                offset: 0,
                data: Vec::new(),
            }];
        }

        let mut offset = 0u64;
        data.chunks(self.chunk_size as usize)
            .map(|slice| {
                let chunk = Chunk {
                    offset,
                    data: slice.to_vec(),
                };
                offset += slice.len() as u64;
                chunk
            })
            .collect()
    }

    /// Wrap an async reader, yielding chunks one at a time.
    pub fn stream<R: AsyncRead + Unpin>(&self, reader: R) -> ChunkStream<R> {
        ChunkStream {
            reader,
            chunk_size: self.chunk_size as usize,
            offset: 0,
            yielded: false,
            done: false,
        }
    }
}

/// Incremental chunk reader over an [`AsyncRead`].
///
/// Only one chunk is held in memory at a time.
pub struct ChunkStream<R> {
    reader: R,
    chunk_size: usize,
    offset: u64,
    yielded: bool,
    done: bool,
}

impl<R: AsyncRead + Unpin> ChunkStream<R> {
    /// Read the next chunk. Returns `None` once the reader is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, DagError> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;

        // Read exactly chunk_size bytes, or until EOF.
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            if self.yielded {
                return Ok(None);
            }
            // Zero-byte file: one empty chunk.
            self.yielded = true;
            return Ok(Some(Chunk {
                offset: 0,
                data: Vec::new(),
            }));
        }

        buf.truncate(filled);
        let chunk = Chunk {
            offset: self.offset,
            data: buf,
        };
        self.offset += filled as u64;
        self.yielded = true;
        Ok(Some(chunk))
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

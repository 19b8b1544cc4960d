//! Pull-based chunk sources
//!
//! The session pulls raw byte chunks from a [`ChunkSource`]. In
//! production the chunks come from a chunked HTTP response body; tests
//! and hosts that already own a stream feed a [`ChannelSource`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::error::Result;

/// A pull-based source of byte chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// Await the next chunk. `Ok(None)` signals a clean end-of-stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Chunk source over any `AsyncRead` (an HTTP body reader in practice)
pub struct IoSource<R> {
    reader: R,
    scratch: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> IoSource<R> {
    pub fn new(reader: R, scratch_size: usize) -> Self {
        Self {
            reader,
            scratch: vec![0u8; scratch_size.max(1)],
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for IoSource<R> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let n = self.reader.read(&mut self.scratch).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.scratch[..n])))
    }
}

/// Chunk source fed from an mpsc channel; closing the sender ends the
/// stream.
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Convenience constructor returning the feeding half as well
    pub fn pair(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.rx.recv().await)
    }
}

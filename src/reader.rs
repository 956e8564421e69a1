use std::io::ErrorKind;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::StreamError;

/// Outcome of a single chunk read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// `n` fresh bytes at the front of the buffer
    Data(usize),
    Eof,
}

/// Statistics for one reader's lifetime
#[derive(Debug, Clone, Default)]
pub struct ReadStats {
    pub bytes_read: u64,
    pub chunks_read: u64,
    /// Reads retried after `Interrupted`/`WouldBlock`
    pub retries: u64,
    pub duration_ms: u64,
}

/// Pulls chunks from an async byte source
///
/// Every read races the cancellation token; cancellation wins when both are
/// ready.
pub struct ChunkReader<'a, R> {
    inner: R,
    cancel: &'a CancelToken,
    min_chunk_size: usize,
    stats: ReadStats,
    started: Instant,
    eof: bool,
}

impl<'a, R: AsyncRead + Unpin> ChunkReader<'a, R> {
    pub fn new(inner: R, cancel: &'a CancelToken, min_chunk_size: usize) -> Self {
        Self {
            inner,
            cancel,
            min_chunk_size: min_chunk_size.max(1),
            stats: ReadStats::default(),
            started: Instant::now(),
            eof: false,
        }
    }

    /// Read the next chunk into `buf`, starting at index 0
    ///
    /// `buf` is reused as-is; it only grows when shorter than the configured
    /// minimum chunk size. Interrupted reads are retried.
    pub async fn read_chunk(&mut self, buf: &mut Vec<u8>) -> Result<Chunk, StreamError> {
        if self.eof {
            return Ok(Chunk::Eof);
        }
        if buf.len() < self.min_chunk_size {
            buf.resize(self.min_chunk_size, 0);
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                r = self.inner.read(&mut buf[..]) => r,
            };

            match result {
                Ok(0) => {
                    self.eof = true;
                    self.stats.duration_ms = self.started.elapsed().as_millis() as u64;
                    debug!(
                        bytes_read = self.stats.bytes_read,
                        chunks_read = self.stats.chunks_read,
                        "Reached end of stream"
                    );
                    return Ok(Chunk::Eof);
                }
                Ok(n) => {
                    self.stats.bytes_read += n as u64;
                    self.stats.chunks_read += 1;
                    return Ok(Chunk::Data(n));
                }
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                    self.stats.retries += 1;
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    warn!(error = %e, bytes_read = self.stats.bytes_read, "Error reading from input");
                    return Err(StreamError::Io(e));
                }
            }
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.stats.bytes_read
    }

    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }
}

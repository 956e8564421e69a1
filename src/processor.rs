// Drives reader + tokenizer over one stream and measures it, either inline or
// through the worker pool.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::{Mode, StreamingConfig};
use crate::error::{ConfigError, PartialFailure, StreamError};
use crate::normalizer::{normalize_bytes_into, normalized_char_count, NormalizeState};
use crate::parallel;
use crate::pool::{BufferPools, PooledBuffer};
use crate::reader::{Chunk, ChunkReader};
use crate::tokenizer::{TokenSink, Tokenizer};

/// What a stream pass measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Words or lines emitted; chunk segments follow read boundaries and are not counted
    pub tokens: u64,
    /// Chars in the normalized form of every token
    pub chars: u64,
    /// Raw bytes read from the source
    pub bytes: u64,
}

impl StreamStats {
    /// The quantity a mode is scored on
    pub fn count(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Word => self.tokens,
            Mode::Line | Mode::Chunk => self.chars,
        }
    }

    pub fn merge(&mut self, other: &StreamStats) {
        self.tokens += other.tokens;
        self.chars += other.chars;
        self.bytes += other.bytes;
    }
}

/// Normalize and measure one token
///
/// `chunk_state` only matters in chunk mode, where normalization state runs
/// across segments. Words and lines start fresh. When `out` is given the
/// normalized token is appended to it, followed by a space (word) or a
/// newline (line).
pub(crate) fn measure_token(
    mode: Mode,
    token: &[u8],
    chunk_state: &mut NormalizeState,
    stats: &mut StreamStats,
    out: Option<&mut Vec<u8>>,
) {
    if mode != Mode::Chunk {
        stats.tokens += 1;
    }
    let mut fresh = NormalizeState::new();
    let state = match mode {
        Mode::Chunk => chunk_state,
        Mode::Word | Mode::Line => &mut fresh,
    };
    match out {
        Some(out) => {
            let before = out.len();
            normalize_bytes_into(token, state, out);
            stats.chars += count_utf8_chars(&out[before..]);
            match mode {
                Mode::Word => out.push(b' '),
                Mode::Line => out.push(b'\n'),
                Mode::Chunk => {}
            }
        }
        None => stats.chars += normalized_char_count(token, state),
    }
}

fn count_utf8_chars(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b & 0xC0 != 0x80).count() as u64
}

/// Sequential token sink: measures tokens and polls cancellation every
/// `check_interval` tokens
struct TokenCounter<'a> {
    mode: Mode,
    stats: StreamStats,
    chunk_state: NormalizeState,
    output: Option<PooledBuffer>,
    cancel: Option<&'a CancelToken>,
    check_interval: usize,
    since_check: usize,
}

impl<'a> TokenCounter<'a> {
    fn new(mode: Mode, cancel: Option<&'a CancelToken>, check_interval: usize, output: Option<PooledBuffer>) -> Self {
        Self {
            mode,
            stats: StreamStats::default(),
            chunk_state: NormalizeState::new(),
            output,
            cancel,
            check_interval: check_interval.max(1),
            since_check: 0,
        }
    }
}

impl TokenSink for TokenCounter<'_> {
    fn accept(&mut self, token: &[u8]) -> Result<(), StreamError> {
        self.since_check += 1;
        if self.since_check >= self.check_interval {
            self.since_check = 0;
            if self.cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(StreamError::Cancelled);
            }
        }
        measure_token(
            self.mode,
            token,
            &mut self.chunk_state,
            &mut self.stats,
            self.output.as_deref_mut(),
        );
        Ok(())
    }
}

/// Measure an in-memory text exactly as a stream pass would
pub fn count_text(mode: Mode, text: &[u8]) -> StreamStats {
    let mut tokenizer = Tokenizer::new(mode);
    let mut counter = TokenCounter::new(mode, None, usize::MAX, None);
    // Without a cancel token the sink cannot fail.
    let fed = tokenizer.feed(text, &mut counter);
    debug_assert!(fed.is_ok());
    let finished = tokenizer.finish(&mut counter);
    debug_assert!(finished.is_ok());
    let mut stats = counter.stats;
    stats.bytes = text.len() as u64;
    stats
}

/// Measures byte streams according to a `StreamingConfig`
#[derive(Debug, Clone)]
pub struct StreamProcessor {
    config: StreamingConfig,
    pools: BufferPools,
}

impl StreamProcessor {
    pub fn new(config: StreamingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pools = BufferPools::new(config.chunk_size);
        Ok(Self { config, pools })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn pools(&self) -> &BufferPools {
        &self.pools
    }

    /// Measure one stream
    pub async fn process<R>(&self, reader: R, cancel: &CancelToken) -> Result<StreamStats, PartialFailure>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.run(reader, None::<&mut tokio::io::Sink>, cancel).await
    }

    /// Measure one stream and write its normalized form to `writer`
    ///
    /// Words are followed by a space, lines by `\n`; chunk mode writes the
    /// normalized text as-is. Output order matches input order in both
    /// sequential and parallel mode.
    pub async fn process_with_writer<R, W>(
        &self,
        reader: R,
        writer: &mut W,
        cancel: &CancelToken,
    ) -> Result<StreamStats, PartialFailure>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        self.run(reader, Some(writer), cancel).await
    }

    async fn run<R, W>(&self, reader: R, writer: Option<&mut W>, cancel: &CancelToken) -> Result<StreamStats, PartialFailure>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let start_time = Instant::now();
        let mode = self.config.mode;
        let result = if self.config.parallel {
            parallel::run_parallel(&self.config, &self.pools, reader, writer, cancel).await
        } else {
            self.run_sequential(reader, writer, cancel).await
        };

        match &result {
            Ok(stats) => debug!(
                mode = %mode,
                parallel = self.config.parallel,
                tokens = stats.tokens,
                chars = stats.chars,
                bytes_processed = stats.bytes,
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Stream processing completed"
            ),
            Err(failure) => warn!(
                mode = %mode,
                error = %failure.source,
                partial_count = failure.partial.count(mode),
                bytes_processed = failure.partial.bytes,
                "Stream processing stopped early"
            ),
        }
        result
    }

    async fn run_sequential<R, W>(
        &self,
        reader: R,
        mut writer: Option<&mut W>,
        cancel: &CancelToken,
    ) -> Result<StreamStats, PartialFailure>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mode = self.config.mode;
        let mut chunk = self.pools.chunk.acquire();
        chunk.resize(self.config.chunk_size, 0);

        let mut reader = ChunkReader::new(reader, cancel, self.config.chunk_size);
        let mut tokenizer = Tokenizer::new(mode);
        let output = writer.is_some().then(|| self.pools.token.acquire());
        let mut counter = TokenCounter::new(mode, Some(cancel), self.config.cancel_check_interval, output);

        let outcome: Result<(), StreamError> = async {
            loop {
                match reader.read_chunk(&mut chunk).await? {
                    Chunk::Data(n) => tokenizer.feed(&chunk[..n], &mut counter)?,
                    Chunk::Eof => {
                        tokenizer.finish(&mut counter)?;
                        flush_output(writer.as_deref_mut(), counter.output.as_deref_mut()).await?;
                        break;
                    }
                }
                flush_output(writer.as_deref_mut(), counter.output.as_deref_mut()).await?;
            }
            if let Some(w) = writer.as_deref_mut() {
                w.flush().await?;
            }
            Ok(())
        }
        .await;

        let mut stats = counter.stats;
        stats.bytes = reader.bytes_read();
        match outcome {
            Ok(()) => Ok(stats),
            Err(e) => Err(PartialFailure::new(stats, e)),
        }
    }
}

async fn flush_output<W>(writer: Option<&mut W>, output: Option<&mut Vec<u8>>) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin,
{
    if let (Some(writer), Some(output)) = (writer, output) {
        if !output.is_empty() {
            writer.write_all(output).await?;
            output.clear();
        }
    }
    Ok(())
}

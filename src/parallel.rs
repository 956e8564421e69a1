// Worker-pool path: the producer tokenizes into batched jobs, spawned workers
// normalize and measure them, and results are folded back in sequence order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::{Mode, StreamingConfig};
use crate::error::{PartialFailure, StreamError};
use crate::normalizer::{is_separator, NormalizeState};
use crate::pool::{BufferPool, BufferPools, PooledBuffer};
use crate::processor::{measure_token, StreamStats};
use crate::reader::{Chunk, ChunkReader};
use crate::tokenizer::{TokenRange, TokenSink, Tokenizer};
use crate::utf8::LossyChars;

/// Bound on jobs waiting for a worker
pub const MAX_JOB_QUEUE: usize = 32;

/// A batch of tokens packed into one owned buffer
#[derive(Debug)]
pub struct Job {
    pub seq: u64,
    pub data: PooledBuffer,
    pub ranges: Vec<TokenRange>,
    /// Chunk mode: the text before this job ended in a separator
    pub leading_space: bool,
}

#[derive(Debug)]
pub struct JobResult {
    pub seq: u64,
    pub stats: StreamStats,
    pub output: Option<PooledBuffer>,
    pub error: Option<StreamError>,
}

impl JobResult {
    fn failed(seq: u64, error: StreamError) -> Self {
        Self {
            seq,
            stats: StreamStats::default(),
            output: None,
            error: Some(error),
        }
    }
}

/// Token sink on the producer side: packs tokens into jobs
///
/// A job closes once it holds `batch_size` tokens or `byte_budget` bytes.
struct JobBuilder {
    mode: Mode,
    batch_size: usize,
    byte_budget: usize,
    pool: BufferPool,
    current: Option<Job>,
    next_seq: u64,
    ready: VecDeque<Job>,
    /// Chunk mode: everything emitted so far ends in a separator
    ends_in_separator: bool,
}

impl JobBuilder {
    fn new(mode: Mode, batch_size: usize, byte_budget: usize, pool: BufferPool) -> Self {
        Self {
            mode,
            batch_size,
            byte_budget,
            pool,
            current: None,
            next_seq: 0,
            ready: VecDeque::new(),
            ends_in_separator: false,
        }
    }

    fn flush(&mut self) {
        if let Some(job) = self.current.take() {
            self.ready.push_back(job);
        }
    }

    fn jobs_created(&self) -> u64 {
        self.next_seq
    }
}

impl TokenSink for JobBuilder {
    fn accept(&mut self, token: &[u8]) -> Result<(), StreamError> {
        if self.current.is_none() {
            self.current = Some(Job {
                seq: self.next_seq,
                data: self.pool.acquire(),
                ranges: Vec::with_capacity(self.batch_size.min(4096)),
                leading_space: self.ends_in_separator,
            });
            self.next_seq += 1;
        }
        let Some(job) = self.current.as_mut() else {
            return Ok(());
        };

        let start = job.data.len();
        job.data.extend_from_slice(token);
        job.ranges.push(TokenRange::new(start, job.data.len()));
        let full = job.ranges.len() >= self.batch_size || job.data.len() >= self.byte_budget;

        if self.mode == Mode::Chunk {
            if let Some(ends) = ends_with_separator(token) {
                self.ends_in_separator = ends;
            }
        }
        if full {
            self.flush();
        }
        Ok(())
    }
}

/// Whether the last char of `bytes` normalizes to a space; `None` when empty
///
/// Decodes only the final sequence, resynchronizing on the last lead byte.
fn ends_with_separator(bytes: &[u8]) -> Option<bool> {
    let floor = bytes.len().saturating_sub(4);
    let start = (floor..bytes.len())
        .rev()
        .find(|&i| bytes[i] & 0xC0 != 0x80)
        .unwrap_or(floor);
    LossyChars::new(&bytes[start..]).last().map(is_separator)
}

/// Folds job results back into input order
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: BTreeMap<u64, JobResult>,
    next_seq: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: JobResult) {
        self.pending.insert(result.seq, result);
    }

    /// Next result in sequence, if it has arrived
    pub fn pop_ready(&mut self) -> Option<JobResult> {
        let result = self.pending.remove(&self.next_seq)?;
        self.next_seq += 1;
        Some(result)
    }

    /// Results waiting on an earlier sequence number
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

fn process_job(job: &Job, mode: Mode, output_pool: Option<&BufferPool>) -> JobResult {
    let mut stats = StreamStats::default();
    let mut output = output_pool.map(BufferPool::acquire);
    let mut chunk_state = NormalizeState::after_separator(job.leading_space);
    for range in &job.ranges {
        measure_token(
            mode,
            range.slice(&job.data),
            &mut chunk_state,
            &mut stats,
            output.as_deref_mut(),
        );
    }
    JobResult {
        seq: job.seq,
        stats,
        output,
        error: None,
    }
}

async fn worker_loop(
    worker_id: usize,
    mode: Mode,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    cancel: CancelToken,
    output_pool: Option<BufferPool>,
) -> u64 {
    let mut processed = 0u64;
    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };

        if cancel.is_cancelled() {
            let _ = results.send(JobResult::failed(job.seq, StreamError::Cancelled)).await;
            break;
        }

        let result = process_job(&job, mode, output_pool.as_ref());
        drop(job);
        processed += 1;
        if results.send(result).await.is_err() {
            break;
        }
    }
    debug!(worker_id, jobs_processed = processed, "Worker finished");
    processed
}

/// Measure one stream over a worker pool
///
/// The producer and the ordered collector both run on the calling task;
/// only job processing is spawned. On the first failure the producer stops
/// dispatching, in-flight jobs drain, and the in-order prefix folded so far
/// comes back as the partial count.
pub(crate) async fn run_parallel<R, W>(
    config: &StreamingConfig,
    pools: &BufferPools,
    reader: R,
    mut writer: Option<&mut W>,
    cancel: &CancelToken,
) -> Result<StreamStats, PartialFailure>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let start_time = Instant::now();
    let mode = config.mode;
    let workers = config.worker_count();
    let stop = CancelToken::new();

    let (job_tx, job_rx) = mpsc::channel::<Job>(MAX_JOB_QUEUE);
    let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(workers.saturating_mul(2));
    let job_rx = Arc::new(Mutex::new(job_rx));
    let output_pool = writer.is_some().then(|| pools.token.clone());

    let handles: Vec<_> = (0..workers)
        .map(|worker_id| {
            tokio::spawn(worker_loop(
                worker_id,
                mode,
                Arc::clone(&job_rx),
                result_tx.clone(),
                cancel.clone(),
                output_pool.clone(),
            ))
        })
        .collect();
    drop(result_tx);
    drop(job_rx);

    let producer = async {
        let mut chunk = pools.chunk.acquire();
        chunk.resize(config.chunk_size, 0);
        let mut reader = ChunkReader::new(reader, cancel, config.chunk_size);
        let mut tokenizer = Tokenizer::new(mode);
        let mut builder = JobBuilder::new(mode, config.batch_size, config.chunk_size, pools.batch.clone());

        let outcome: Result<(), StreamError> = async {
            loop {
                if stop.is_cancelled() {
                    return Ok(());
                }
                let at_eof = match reader.read_chunk(&mut chunk).await? {
                    Chunk::Data(n) => {
                        tokenizer.feed(&chunk[..n], &mut builder)?;
                        false
                    }
                    Chunk::Eof => {
                        tokenizer.finish(&mut builder)?;
                        builder.flush();
                        true
                    }
                };
                while let Some(job) = builder.ready.pop_front() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                        _ = stop.cancelled() => return Ok(()),
                        sent = job_tx.send(job) => sent.map_err(|_| {
                            StreamError::WorkerPanicked("job queue closed".to_string())
                        })?,
                    }
                }
                if at_eof {
                    return Ok(());
                }
            }
        }
        .await;

        // Closing the queue lets idle workers exit.
        drop(job_tx);
        (outcome, reader.bytes_read(), builder.jobs_created())
    };

    let collector = async {
        let mut reassembler = Reassembler::new();
        let mut total = StreamStats::default();
        let mut first_error: Option<StreamError> = None;
        let mut failed_seq: Option<u64> = None;

        while let Some(mut result) = result_rx.recv().await {
            if let Some(error) = result.error.take() {
                if first_error.is_none() {
                    warn!(seq = result.seq, error = %error, "Job failed, stopping dispatch");
                    first_error = Some(error);
                    failed_seq = Some(result.seq);
                    stop.cancel();
                }
                continue;
            }
            reassembler.push(result);

            while failed_seq != Some(reassembler.next_seq()) {
                let Some(ready) = reassembler.pop_ready() else { break };
                total.merge(&ready.stats);
                if first_error.is_some() {
                    continue;
                }
                if let (Some(w), Some(out)) = (writer.as_deref_mut(), ready.output.as_deref()) {
                    if let Err(e) = w.write_all(out).await {
                        first_error = Some(StreamError::Io(e));
                        stop.cancel();
                    }
                }
            }
        }

        if first_error.is_none() {
            if let Some(w) = writer.as_deref_mut() {
                if let Err(e) = w.flush().await {
                    first_error = Some(StreamError::Io(e));
                }
            }
        }
        (total, first_error, reassembler.buffered())
    };

    let ((produced, bytes, jobs), (mut total, collected_error, stranded)) = tokio::join!(producer, collector);

    let mut join_error = None;
    for joined in futures::future::join_all(handles).await {
        if let Err(e) = joined {
            join_error.get_or_insert_with(|| StreamError::WorkerPanicked(e.to_string()));
        }
    }

    total.bytes = bytes;
    let error = if cancel.is_cancelled() {
        Some(StreamError::Cancelled)
    } else {
        produced.err().or(collected_error).or(join_error)
    };

    match error {
        None if stranded > 0 => Err(PartialFailure::new(
            total,
            StreamError::WorkerPanicked(format!("{stranded} job results never reassembled")),
        )),
        None => {
            debug!(
                workers,
                jobs,
                tokens = total.tokens,
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Parallel pass completed"
            );
            Ok(total)
        }
        Some(error) => Err(PartialFailure::new(total, error)),
    }
}

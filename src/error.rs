use thiserror::Error;

use crate::processor::StreamStats;

/// Invalid configuration, detected once at construction time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("threshold must be between 0 and 1, got {0}")]
    Threshold(f64),

    #[error("max_diff_ratio must be a finite value greater than 0, got {0}")]
    MaxDiffRatio(f64),

    #[error("chunk_size must be greater than 0")]
    ChunkSize,

    #[error("batch_size must be greater than 0")]
    BatchSize,

    #[error("workers must be between 1 and 1024 when set, got {0}")]
    Workers(usize),

    #[error("precision must be at most 15 decimal places, got {0}")]
    Precision(u32),

    #[error("cancel_check_interval must be greater than 0")]
    CancelCheckInterval,
}

/// Failures that can interrupt a stream pass
///
/// Normalization and tokenization never fail: malformed input degrades to
/// U+FFFD. Only I/O and cancellation propagate.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("processing cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    WorkerPanicked(String),
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// Stable machine-readable reason used in result details
    pub fn reason(&self) -> &'static str {
        match self {
            StreamError::Io(_) => "io_error",
            StreamError::Cancelled => "cancelled",
            StreamError::WorkerPanicked(_) => "worker_failed",
        }
    }
}

/// A stream pass that stopped early
///
/// `partial` holds whatever was folded in order before the failure. It is a
/// best-effort figure and must not be used as an authoritative count.
#[derive(Debug, Error)]
#[error("{source} (after {} bytes)", partial.bytes)]
pub struct PartialFailure {
    pub partial: StreamStats,
    #[source]
    pub source: StreamError,
}

impl PartialFailure {
    pub fn new(partial: StreamStats, source: StreamError) -> Self {
        Self { partial, source }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::scorer::{ScoreConfig, MAX_PRECISION};

/// Default read size for streaming passes (8KB)
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default number of tokens packed into one parallel job
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Tokens between cancellation checks on the sequential path
pub const DEFAULT_CANCEL_CHECK_INTERVAL: usize = 5000;

/// Upper bound on an explicit worker count
pub const MAX_WORKERS: usize = 1024;

pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MAX_DIFF_RATIO: f64 = 0.3;

/// Unit a stream is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No tokenization; normalized character count of the whole stream
    Chunk,
    /// Lines split on LF, CRLF or lone CR; sum of normalized line lengths
    Line,
    /// Word tokens; number of words
    Word,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chunk => "chunk",
            Mode::Line => "line",
            Mode::Word => "word",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chunk" => Ok(Mode::Chunk),
            "line" => Ok(Mode::Line),
            "word" => Ok(Mode::Word),
            other => Err(format!(
                "invalid streaming mode: {other}. Must be 'chunk', 'line', or 'word'"
            )),
        }
    }
}

/// Tunables for a streaming similarity pass
///
/// Construct with struct-update syntax over `Default` and hand it to
/// `StreamSimilarity::new`, which validates it once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Bytes requested per read
    pub chunk_size: usize,
    /// Tokens per parallel job
    pub batch_size: usize,
    pub mode: Mode,
    /// Fan normalization out over a worker pool
    pub parallel: bool,
    /// Worker count for parallel mode (default: number of CPUs)
    pub workers: Option<usize>,
    /// Minimum score for a pass, in [0, 1]
    pub threshold: f64,
    /// Fraction of the original count at which the score bottoms out
    pub max_diff_ratio: f64,
    /// Decimal places applied to score and ratio
    pub precision: Option<u32>,
    /// Tokens between cancellation checks on the sequential path
    pub cancel_check_interval: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            mode: Mode::Line,
            parallel: false,
            workers: None,
            threshold: DEFAULT_THRESHOLD,
            max_diff_ratio: DEFAULT_MAX_DIFF_RATIO,
            precision: None,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
        }
    }
}

impl StreamingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_score_params(&self.score_config())?;
        if self.chunk_size == 0 {
            return Err(ConfigError::ChunkSize);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        if let Some(workers) = self.workers {
            if workers == 0 || workers > MAX_WORKERS {
                return Err(ConfigError::Workers(workers));
            }
        }
        if self.cancel_check_interval == 0 {
            return Err(ConfigError::CancelCheckInterval);
        }
        Ok(())
    }

    /// Effective worker count for parallel mode
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).clamp(1, MAX_WORKERS)
    }

    pub fn score_config(&self) -> ScoreConfig {
        ScoreConfig {
            threshold: self.threshold,
            max_diff_ratio: self.max_diff_ratio,
            precision: self.precision,
        }
    }
}

/// Shared score validation for every calculator
pub fn validate_score_params(config: &ScoreConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.threshold) {
        return Err(ConfigError::Threshold(config.threshold));
    }
    if !(config.max_diff_ratio.is_finite() && config.max_diff_ratio > 0.0) {
        return Err(ConfigError::MaxDiffRatio(config.max_diff_ratio));
    }
    match config.precision {
        Some(places) if places > MAX_PRECISION => Err(ConfigError::Precision(places)),
        _ => Ok(()),
    }
}

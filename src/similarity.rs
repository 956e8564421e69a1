// Similarity calculators: the streaming orchestrator over two readers and the
// in-memory word/character calculator. Both score through `scorer::score`.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::{validate_score_params, Mode, StreamingConfig};
use crate::error::{ConfigError, PartialFailure};
use crate::processor::{count_text, StreamProcessor, StreamStats};
use crate::scorer::{score, Score, ScoreConfig};

/// Why a computation produced no real score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Cancelled,
    Io,
}

/// Immutable outcome of one similarity computation
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityResult {
    pub name: &'static str,
    pub score: f64,
    pub passed: bool,
    pub original_count: u64,
    pub augmented_count: u64,
    /// min/max of the two counts
    pub count_ratio: f64,
    pub threshold: f64,
    pub bytes_processed: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub details: BTreeMap<String, Value>,
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

impl SimilarityResult {
    fn scored(
        name: &'static str,
        original: u64,
        augmented: u64,
        config: &ScoreConfig,
        mut details: BTreeMap<String, Value>,
    ) -> Self {
        let Score { score, ratio, passed } = score(original, augmented, config);
        if original == 0 && augmented == 0 {
            details.insert("note".into(), json!("both texts are empty, considered identical"));
        } else if original == 0 {
            details.insert("warning".into(), json!("original text has zero length"));
        }
        details.insert("original_length".into(), json!(original));
        details.insert("augmented_length".into(), json!(augmented));
        details.insert("length_ratio".into(), json!(ratio));
        details.insert("threshold".into(), json!(config.threshold));
        Self {
            name,
            score,
            passed,
            original_count: original,
            augmented_count: augmented,
            count_ratio: ratio,
            threshold: config.threshold,
            bytes_processed: 0,
            elapsed: Duration::ZERO,
            failure: None,
            details,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Streaming length similarity over two async readers
#[derive(Debug, Clone)]
pub struct StreamSimilarity {
    processor: StreamProcessor,
}

impl StreamSimilarity {
    pub const NAME: &'static str = "streaming_similarity";

    /// Validate `config` once; computations never fail on configuration
    pub fn new(config: StreamingConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            processor: StreamProcessor::new(config)?,
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        self.processor.config()
    }

    /// Score `augmented` against `original`
    ///
    /// The streams are processed one after the other, original first. A
    /// failure on the original leaves the augmented reader untouched. Never
    /// panics and never returns an error: failures come back as a failed
    /// result with `details.reason` set.
    pub async fn compute<O, A>(&self, cancel: &CancelToken, original: O, augmented: A) -> SimilarityResult
    where
        O: AsyncRead + Unpin + Send,
        A: AsyncRead + Unpin + Send,
    {
        let start_time = Instant::now();
        let config = self.processor.config();

        let orig = match self.processor.process(original, cancel).await {
            Ok(stats) => stats,
            Err(failure) => return self.failed("original", failure, None, start_time),
        };
        let aug = match self.processor.process(augmented, cancel).await {
            Ok(stats) => stats,
            Err(failure) => return self.failed("augmented", failure, Some(&orig), start_time),
        };

        let mode = config.mode;
        let mut details = BTreeMap::new();
        details.insert("mode".into(), json!(mode));
        details.insert("original_tokens".into(), json!(orig.tokens));
        details.insert("augmented_tokens".into(), json!(aug.tokens));

        let mut result = SimilarityResult::scored(
            Self::NAME,
            orig.count(mode),
            aug.count(mode),
            &config.score_config(),
            details,
        );
        result.bytes_processed = orig.bytes + aug.bytes;
        result.elapsed = start_time.elapsed();

        debug!(
            mode = %mode,
            score = result.score,
            passed = result.passed,
            original_count = result.original_count,
            augmented_count = result.augmented_count,
            bytes_processed = result.bytes_processed,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Computed streaming similarity"
        );
        result
    }

    /// `compute` over in-memory strings
    pub async fn compute_strings(&self, cancel: &CancelToken, original: &str, augmented: &str) -> SimilarityResult {
        self.compute(cancel, original.as_bytes(), augmented.as_bytes()).await
    }

    fn failed(
        &self,
        stream: &'static str,
        failure: PartialFailure,
        before: Option<&StreamStats>,
        start_time: Instant,
    ) -> SimilarityResult {
        let config = self.processor.config();
        let PartialFailure { partial, source } = failure;
        let kind = if source.is_cancelled() {
            FailureKind::Cancelled
        } else {
            FailureKind::Io
        };
        warn!(stream, error = %source, "Streaming similarity failed");

        let mut details = BTreeMap::new();
        details.insert("reason".into(), json!(source.reason()));
        details.insert("stream".into(), json!(stream));
        details.insert("error".into(), json!(format!("error processing {stream} stream: {source}")));
        details.insert("partial_count".into(), json!(partial.count(config.mode)));

        SimilarityResult {
            name: Self::NAME,
            score: 0.0,
            passed: false,
            original_count: before.map_or(0, |s| s.count(config.mode)),
            augmented_count: 0,
            count_ratio: 0.0,
            threshold: config.threshold,
            bytes_processed: before.map_or(0, |s| s.bytes) + partial.bytes,
            elapsed: start_time.elapsed(),
            failure: Some(kind),
            details,
        }
    }
}

/// What the in-memory calculator counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Word tokens
    Words,
    /// Chars of the normalized text
    Characters,
}

impl Metric {
    fn mode(self) -> Mode {
        match self {
            Metric::Words => Mode::Word,
            Metric::Characters => Mode::Chunk,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Words => "length_similarity",
            Metric::Characters => "character_similarity",
        }
    }

    /// Characters round to two places unless told otherwise
    pub fn default_precision(self) -> Option<u32> {
        match self {
            Metric::Words => None,
            Metric::Characters => Some(2),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "words" | "word" => Ok(Metric::Words),
            "characters" | "chars" | "character" => Ok(Metric::Characters),
            other => Err(format!("invalid metric '{other}', expected words or characters")),
        }
    }
}

/// Non-streaming length similarity over in-memory strings
///
/// Counts with the same tokenizer and normalizer as the streaming path, so a
/// string scores identically whichever way it is fed in.
#[derive(Debug, Clone)]
pub struct LengthSimilarity {
    metric: Metric,
    config: ScoreConfig,
}

impl LengthSimilarity {
    pub fn new(metric: Metric, config: ScoreConfig) -> Result<Self, ConfigError> {
        validate_score_params(&config)?;
        Ok(Self { metric, config })
    }

    /// Default threshold and ratio with the metric's default precision
    pub fn with_defaults(metric: Metric) -> Self {
        Self {
            metric,
            config: ScoreConfig {
                precision: metric.default_precision(),
                ..ScoreConfig::default()
            },
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    pub fn compute(&self, original: &str, augmented: &str) -> SimilarityResult {
        let start_time = Instant::now();
        let mode = self.metric.mode();
        let orig = count_text(mode, original.as_bytes());
        let aug = count_text(mode, augmented.as_bytes());

        let mut result = SimilarityResult::scored(
            self.metric.name(),
            orig.count(mode),
            aug.count(mode),
            &self.config,
            BTreeMap::new(),
        );
        result.bytes_processed = orig.bytes + aug.bytes;
        result.elapsed = start_time.elapsed();

        debug!(
            metric = self.metric.name(),
            score = result.score,
            passed = result.passed,
            original_count = result.original_count,
            augmented_count = result.augmented_count,
            "Computed length similarity"
        );
        result
    }
}

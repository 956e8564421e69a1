pub mod cancel;
pub mod category;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod parallel;
pub mod pool;
pub mod processor;
pub mod reader;
pub mod scorer;
pub mod similarity;
pub mod tokenizer;
pub mod utf8;

// Re-export the calculator surface for convenient access
pub use cancel::CancelToken;
pub use config::{Mode, StreamingConfig};
pub use error::{ConfigError, PartialFailure, StreamError};
pub use similarity::{FailureKind, LengthSimilarity, Metric, SimilarityResult, StreamSimilarity};

// Lower-level pieces, used by the benchmarks
pub use normalizer::{normalize, normalize_bytes_into, NormalizeState};
pub use processor::{count_text, StreamProcessor, StreamStats};
pub use scorer::{score, Score, ScoreConfig};
pub use tokenizer::{TokenSink, Tokenizer};

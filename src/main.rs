use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::{info, warn, Level};

use lensim::{
    CancelToken, LengthSimilarity, Metric, Mode, ScoreConfig, SimilarityResult, StreamSimilarity,
    StreamingConfig,
};

#[derive(Parser, Debug)]
#[command(name = "lensim")]
#[command(about = "Length-similarity gate for original/augmented text pairs")]
#[command(version)]
#[command(group(ArgGroup::new("original_input").required(true).args(["original", "original_file"])))]
#[command(group(ArgGroup::new("augmented_input").required(true).args(["augmented", "augmented_file"])))]
struct Args {
    /// Original text
    #[arg(long)]
    original: Option<String>,

    /// Augmented text
    #[arg(long)]
    augmented: Option<String>,

    /// Read the original text from a file
    #[arg(long)]
    original_file: Option<PathBuf>,

    /// Read the augmented text from a file
    #[arg(long)]
    augmented_file: Option<PathBuf>,

    /// What the in-memory calculator counts; `both` runs words then characters
    #[arg(long, value_enum, default_value_t = MetricArg::Words)]
    metric: MetricArg,

    /// Use the chunked streaming pipeline instead of the in-memory calculator
    #[arg(long)]
    streaming: bool,

    /// Streaming unit: chunk, line or word
    #[arg(long)]
    mode: Option<Mode>,

    /// Minimum score for a pass, in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,

    /// Fraction of the original count at which the score reaches zero
    #[arg(long)]
    max_diff_ratio: Option<f64>,

    /// Bytes per read
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Tokens per parallel job
    #[arg(long)]
    batch_size: Option<usize>,

    /// Fan normalization out over a worker pool
    #[arg(long)]
    parallel: bool,

    /// Worker count for --parallel (default: number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Decimal places for score and ratio
    #[arg(long)]
    precision: Option<u32>,

    /// Cancel the computation after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// JSON file with a streaming configuration; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Result format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MetricArg {
    Words,
    Characters,
    Both,
}

impl MetricArg {
    /// Calculators to run, in report order
    fn metrics(self) -> &'static [Metric] {
        match self {
            MetricArg::Words => &[Metric::Words],
            MetricArg::Characters => &[Metric::Characters],
            MetricArg::Both => &[Metric::Words, Metric::Characters],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

enum Input {
    Text(String),
    File(PathBuf),
}

impl Input {
    fn from_args(text: Option<String>, file: Option<PathBuf>) -> Result<Self> {
        match (text, file) {
            (Some(text), None) => Ok(Input::Text(text)),
            (None, Some(path)) => Ok(Input::File(path)),
            _ => anyhow::bail!("exactly one of the text or file forms must be given"),
        }
    }

    async fn open(self) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        match self {
            Input::Text(text) => Ok(Box::new(std::io::Cursor::new(text.into_bytes()))),
            Input::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?;
                Ok(Box::new(file))
            }
        }
    }

    async fn read_to_string(self) -> Result<String> {
        match self {
            Input::Text(text) => Ok(text),
            Input::File(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

async fn load_config(path: Option<&Path>) -> Result<StreamingConfig> {
    let Some(path) = path else {
        return Ok(StreamingConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Overlay explicit flags onto a loaded configuration
fn apply_overrides(mut config: StreamingConfig, args: &Args) -> StreamingConfig {
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(ratio) = args.max_diff_ratio {
        config.max_diff_ratio = ratio;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.parallel {
        config.parallel = true;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.precision.is_some() {
        config.precision = args.precision;
    }
    config
}

/// Run every requested in-memory calculator over the same pair of texts
fn in_memory_results(
    metric: MetricArg,
    config: &StreamingConfig,
    original: &str,
    augmented: &str,
) -> Result<Vec<SimilarityResult>> {
    metric
        .metrics()
        .iter()
        .map(|&metric| -> Result<SimilarityResult> {
            let score_config = ScoreConfig {
                threshold: config.threshold,
                max_diff_ratio: config.max_diff_ratio,
                precision: config.precision.or(metric.default_precision()),
            };
            let calculator = LengthSimilarity::new(metric, score_config).context("invalid score configuration")?;
            Ok(calculator.compute(original, augmented))
        })
        .collect()
}

/// JSON for a single record is the bare object; several become an array
fn render_json(results: &[SimilarityResult]) -> Result<String> {
    Ok(match results {
        [result] => serde_json::to_string_pretty(result)?,
        _ => serde_json::to_string_pretty(results)?,
    })
}

fn print_results(results: &[SimilarityResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", render_json(results)?),
        OutputFormat::Text => {
            for result in results {
                println!("{}: {}", result.name, if result.passed { "PASS" } else { "FAIL" });
                println!("  score: {}", result.score);
                println!("  threshold: {}", result.threshold);
                println!("  original count: {}", result.original_count);
                println!("  augmented count: {}", result.augmented_count);
                println!("  count ratio: {}", result.count_ratio);
                if let Some(reason) = result.details.get("reason") {
                    println!("  failure: {reason}");
                }
                if let Some(error) = result.details.get("error") {
                    println!("  error: {error}");
                }
            }
        }
    }
    Ok(())
}

/// 0 when every result passed, 2 when any failed, 1 when a computation itself failed
fn exit_status(results: &[SimilarityResult]) -> u8 {
    if results.iter().any(SimilarityResult::is_failure) {
        1
    } else if results.iter().all(|result| result.passed) {
        0
    } else {
        2
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // stdout carries the result; logs go to stderr as JSON
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .json()
        .init();

    info!(?args, "Parsed CLI arguments");

    let config = apply_overrides(load_config(args.config.as_deref()).await?, &args);
    let original = Input::from_args(args.original.clone(), args.original_file.clone())?;
    let augmented = Input::from_args(args.augmented.clone(), args.augmented_file.clone())?;

    let cancel = match args.timeout_ms {
        Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
        None => CancelToken::new(),
    };
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let results = if args.streaming {
        let calculator = StreamSimilarity::new(config).context("invalid streaming configuration")?;
        info!(mode = %calculator.config().mode, parallel = calculator.config().parallel, "Starting streaming similarity");
        let original = original.open().await?;
        let augmented = augmented.open().await?;
        vec![calculator.compute(&cancel, original, augmented).await]
    } else {
        let original = original.read_to_string().await?;
        let augmented = augmented.read_to_string().await?;
        in_memory_results(args.metric, &config, &original, &augmented)?
    };

    for result in &results {
        info!(
            name = result.name,
            score = result.score,
            passed = result.passed,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Similarity computed"
        );
    }
    print_results(&results, args.output)?;
    Ok(ExitCode::from(exit_status(&results)))
}

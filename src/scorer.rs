// Closed-form length similarity shared by the streaming and in-memory paths.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_MAX_DIFF_RATIO, DEFAULT_THRESHOLD};

/// Most decimal places `round_to` honours; f64 carries no more
pub const MAX_PRECISION: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub threshold: f64,
    pub max_diff_ratio: f64,
    /// Decimal places for score and ratio; `None` keeps full precision
    pub precision: Option<u32>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_diff_ratio: DEFAULT_MAX_DIFF_RATIO,
            precision: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub score: f64,
    /// min(orig, aug) / max(orig, aug)
    pub ratio: f64,
    pub passed: bool,
}

/// Score two counts
///
/// Total over its domain. The formula is asymmetric: the
/// difference is scaled by the *original* count, so swapping the arguments
/// can change the score while the ratio stays the same.
pub fn score(original: u64, augmented: u64, config: &ScoreConfig) -> Score {
    if original == 0 && augmented == 0 {
        return Score { score: 1.0, ratio: 1.0, passed: true };
    }
    if original == 0 {
        return Score { score: 0.0, ratio: 0.0, passed: false };
    }

    let (lo, hi) = if original > augmented {
        (augmented, original)
    } else {
        (original, augmented)
    };
    let ratio = lo as f64 / hi as f64;

    let diff = original.abs_diff(augmented) as f64;
    let diff_ratio = (diff / (original as f64 * config.max_diff_ratio)).min(1.0);
    let raw = 1.0 - diff_ratio;

    let (score, ratio) = match config.precision {
        Some(places) => (round_to(raw, places), round_to(ratio, places)),
        None => (raw, ratio),
    };

    Score {
        score,
        ratio,
        passed: score >= config.threshold,
    }
}

/// Round half away from zero to `places` decimals, capped at `MAX_PRECISION`
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places.min(MAX_PRECISION) as i32);
    (value * factor).round() / factor
}

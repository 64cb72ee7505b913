// Market-state classification.
//
// Each cluster gets three inputs from its fused signal: the mean fused score
// over the trailing window, the direction of that window (least-squares
// slope with a flat dead band), and AI-overview presence. The mean is turned
// into a percentile within the run so thresholds adapt to corpus scale.
//
// Decision table, first match wins:
//   aio=false, pct >= emerging,    rising  -> Emerging
//   aio=true,  pct >= competitive          -> Competitive
//   aio=true,  pct <  competitive, !rising -> Saturated
//   aio=false, pct <  niche                -> Niche
//   anything else                          -> Niche

use serde::{Deserialize, Serialize};

use crate::db::models::MarketState;
use crate::signals::TrendSignal;

/// Classifier thresholds. Percentiles are on a 0-100 scale; the flat band
/// is an absolute slope on the [0, 1] fused scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    pub emerging_percentile: f64,
    pub competitive_percentile: f64,
    pub niche_percentile: f64,
    pub flat_band: f64,
    /// Trailing window in months.
    pub window: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            emerging_percentile: 50.0,
            competitive_percentile: 75.0,
            niche_percentile: 25.0,
            flat_band: 0.02,
            window: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rising,
    Falling,
    Flat,
}

impl Direction {
    pub fn from_slope(slope: f64, flat_band: f64) -> Self {
        if slope > flat_band {
            Direction::Rising
        } else if slope < -flat_band {
            Direction::Falling
        } else {
            Direction::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rising => "rising",
            Direction::Falling => "falling",
            Direction::Flat => "flat",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Least-squares slope of `values` against 0, 1, 2, ... (0 for fewer than
/// two points).
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    num / den
}

/// Percentile of each value within the population: the share of the other
/// values strictly below it, on 0-100. A population of one scores 100.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 1 {
        return vec![100.0];
    }
    values
        .iter()
        .map(|v| {
            let below = values.iter().filter(|o| *o < v).count();
            100.0 * below as f64 / (n - 1) as f64
        })
        .collect()
}

/// The decision table as a pure function.
pub fn classify(
    aio_present: bool,
    percentile: f64,
    direction: Direction,
    thresholds: &ClassifierThresholds,
) -> MarketState {
    match (aio_present, direction) {
        (false, Direction::Rising) if percentile >= thresholds.emerging_percentile => MarketState::Emerging,
        (true, _) if percentile >= thresholds.competitive_percentile => MarketState::Competitive,
        (true, Direction::Falling | Direction::Flat) => MarketState::Saturated,
        (false, _) if percentile < thresholds.niche_percentile => MarketState::Niche,
        // Fallback for every remaining combination
        _ => MarketState::Niche,
    }
}

/// Classification result for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAssessment {
    pub cluster_id: String,
    pub state: MarketState,
    pub trailing_avg: f64,
    pub percentile: f64,
    pub direction: Direction,
    pub aio_present: bool,
    pub search_unmatched: bool,
}

/// Classify every cluster of a run. Evaluated fresh each run.
pub fn assess(signals: &[TrendSignal], thresholds: &ClassifierThresholds) -> Vec<MarketAssessment> {
    let averages: Vec<f64> = signals.iter().map(|s| s.trailing_fused(thresholds.window)).collect();
    let percentiles = percentile_ranks(&averages);

    signals
        .iter()
        .zip(averages)
        .zip(percentiles)
        .map(|((signal, trailing_avg), percentile)| {
            let window: Vec<f64> = signal
                .trailing(thresholds.window)
                .iter()
                .map(|r| r.fused_score)
                .collect();
            let direction = Direction::from_slope(slope(&window), thresholds.flat_band);
            MarketAssessment {
                cluster_id: signal.cluster_id.clone(),
                state: classify(signal.aio_present, percentile, direction, thresholds),
                trailing_avg,
                percentile,
                direction,
                aio_present: signal.aio_present,
                search_unmatched: signal.search_unmatched,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slope() {
        assert!((slope(&[0.1, 0.2, 0.3]) - 0.1).abs() < 1e-12);
        assert!((slope(&[0.3, 0.3, 0.3])).abs() < 1e-12);
        assert_eq!(slope(&[0.5]), 0.0);
    }

    #[test]
    fn test_direction_dead_band() {
        assert_eq!(Direction::from_slope(0.019, 0.02), Direction::Flat);
        assert_eq!(Direction::from_slope(-0.02, 0.02), Direction::Flat);
        assert_eq!(Direction::from_slope(0.05, 0.02), Direction::Rising);
        assert_eq!(Direction::from_slope(-0.05, 0.02), Direction::Falling);
    }

    #[test]
    fn test_percentile_ranks() {
        assert_eq!(percentile_ranks(&[0.4]), vec![100.0]);
        assert_eq!(percentile_ranks(&[0.1, 0.3, 0.2]), vec![0.0, 100.0, 50.0]);
        // Ties share the lower rank.
        assert_eq!(percentile_ranks(&[0.2, 0.2, 0.9]), vec![0.0, 0.0, 100.0]);
    }

    #[test]
    fn test_decision_table() {
        let t = ClassifierThresholds::default();
        assert_eq!(classify(false, 60.0, Direction::Rising, &t), MarketState::Emerging);
        assert_eq!(classify(true, 80.0, Direction::Falling, &t), MarketState::Competitive);
        assert_eq!(classify(true, 80.0, Direction::Rising, &t), MarketState::Competitive);
        assert_eq!(classify(true, 50.0, Direction::Flat, &t), MarketState::Saturated);
        assert_eq!(classify(true, 50.0, Direction::Falling, &t), MarketState::Saturated);
        assert_eq!(classify(false, 10.0, Direction::Falling, &t), MarketState::Niche);
        // Fallbacks.
        assert_eq!(classify(true, 50.0, Direction::Rising, &t), MarketState::Niche);
        assert_eq!(classify(false, 40.0, Direction::Flat, &t), MarketState::Niche);
    }

    #[test]
    fn test_rising_without_aio_never_becomes_saturated() {
        let t = ClassifierThresholds::default();
        for pct in [0.0, 24.9, 25.0, 40.0, 49.9, 50.0, 60.0, 100.0] {
            let state = classify(false, pct, Direction::Rising, &t);
            assert_ne!(state, MarketState::Saturated);
            assert_ne!(state, MarketState::Competitive);
        }
        assert_eq!(classify(false, 40.0, Direction::Rising, &t), MarketState::Niche);
        assert_eq!(classify(false, 60.0, Direction::Rising, &t), MarketState::Emerging);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = ClassifierThresholds {
            emerging_percentile: 90.0,
            ..Default::default()
        };
        assert_eq!(classify(false, 60.0, Direction::Rising, &t), MarketState::Niche);
    }
}

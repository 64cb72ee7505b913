// Clustering configuration.
//
// Stored on every produced cluster so a partition can be reproduced later.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Distance metric in embedding space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    /// `1 - cosine_similarity`; zero vectors are at distance 1 from everything.
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Cosine => "cosine",
        }
    }

    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => euclidean(a, b),
            Metric::Cosine => match cosine_similarity(a, b) {
                Some(sim) => (1.0 - sim).max(0.0),
                None => 1.0,
            },
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Metric::Euclidean),
            "cosine" => Ok(Metric::Cosine),
            other => Err(EngineError::InvalidParameter(format!(
                "metric must be euclidean or cosine, got {other:?}"
            ))),
        }
    }
}

/// Parameters for density clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Smallest group that counts as a cluster. Must be >= 2.
    pub min_cluster_size: usize,
    /// Neighbour rank used for core distances. Must be >= 1.
    pub min_samples: usize,
    pub metric: Metric,
    /// Selected clusters born below this distance are merged up into their
    /// nearest ancestor born at or above it. 0 disables merging.
    pub cluster_selection_epsilon: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
            metric: Metric::Euclidean,
            cluster_selection_epsilon: 0.0,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_cluster_size < 2 {
            return Err(EngineError::InvalidParameter(format!(
                "min_cluster_size must be >= 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.min_samples < 1 {
            return Err(EngineError::InvalidParameter(format!(
                "min_samples must be >= 1, got {}",
                self.min_samples
            )));
        }
        if !self.cluster_selection_epsilon.is_finite() || self.cluster_selection_epsilon < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "cluster_selection_epsilon must be >= 0, got {}",
                self.cluster_selection_epsilon
            )));
        }
        Ok(())
    }
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity, or `None` when either vector has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

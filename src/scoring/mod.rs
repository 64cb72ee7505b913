// Scoring — turns fused trend signals into market states.

pub mod market;

pub use market::{assess, classify, ClassifierThresholds, Direction, MarketAssessment};

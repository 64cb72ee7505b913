// Cluster prioritizer — decides which clusters get the expensive enrichment
// call when there are more clusters than budget.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::clustering::Partition;
use crate::signals::TrendSignal;

/// Ranking inputs for one non-noise cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub cluster_id: String,
    pub size: usize,
    /// Mean engagement over the trailing window.
    pub engagement: f64,
    pub matched_queries: usize,
}

/// Size desc, trailing engagement desc, matched query count desc, then
/// cluster_id asc. A total order, so ties never depend on input order.
fn compare(a: &Ranked, b: &Ranked) -> Ordering {
    b.size
        .cmp(&a.size)
        .then_with(|| b.engagement.total_cmp(&a.engagement))
        .then_with(|| b.matched_queries.cmp(&a.matched_queries))
        .then_with(|| a.cluster_id.cmp(&b.cluster_id))
}

/// Rank every non-noise cluster of a partition.
pub fn rank(partition: &Partition, signals: &[TrendSignal], window: usize) -> Vec<Ranked> {
    let by_cluster: HashMap<&str, &TrendSignal> = signals.iter().map(|s| (s.cluster_id.as_str(), s)).collect();

    let mut ranked: Vec<Ranked> = partition
        .clusters
        .iter()
        .map(|c| {
            let signal = by_cluster.get(c.cluster_id.as_str());
            Ranked {
                cluster_id: c.cluster_id.clone(),
                size: c.size(),
                engagement: signal.map(|s| s.trailing_engagement(window)).unwrap_or(0.0),
                matched_queries: signal.map(|s| s.matched_queries.len()).unwrap_or(0),
            }
        })
        .collect();

    ranked.sort_by(compare);
    ranked
}

/// Split a ranking into the first `budget` clusters and the rest.
pub fn select(mut ranked: Vec<Ranked>, budget: usize) -> (Vec<Ranked>, Vec<Ranked>) {
    let rest = ranked.split_off(budget.min(ranked.len()));
    (ranked, rest)
}

// Temporal signal fusion.
//
// Engagement volume and search impressions are min-max normalized
// independently over every (cluster, month) cell of the run, then blended
// with fixed weights. Because the range is the run's own range, adding data
// to a later run can shift historical normalized values.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::monthly::{EngagementPoint, Month};
use super::search::SearchIndex;
use crate::topics::ClusterProfile;

/// Fusion constants. The defaults are heuristics, not derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub engagement_weight: f64,
    pub search_weight: f64,
    /// How many top fingerprint keywords are used for search matching.
    pub match_keywords: usize,
    /// Trailing window for the moving average.
    pub moving_average_window: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            engagement_weight: 0.6,
            search_weight: 0.4,
            match_keywords: 10,
            moving_average_window: 3,
        }
    }
}

/// One (cluster, month) cell of the fused series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub cluster_id: String,
    pub month: Month,
    pub post_count: u32,
    pub engagement_volume: f64,
    pub search_impressions: f64,
    pub engagement_norm: f64,
    pub search_norm: f64,
    pub fused_score: f64,
    /// Percent change of fused_score from the previous month; `None` when
    /// the previous month is zero or absent.
    pub mom_change: Option<f64>,
    pub moving_avg_3m: f64,
}

/// Full fused series for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub cluster_id: String,
    /// One row per month of the run's axis, oldest first.
    pub rows: Vec<TrendRow>,
    pub matched_queries: Vec<String>,
    pub dominant_query: Option<String>,
    /// No search-console query matched; the search term is 0.
    pub search_unmatched: bool,
    pub aio_present: bool,
}

impl TrendSignal {
    /// The last `window` rows (fewer if the series is shorter).
    pub fn trailing(&self, window: usize) -> &[TrendRow] {
        &self.rows[self.rows.len().saturating_sub(window)..]
    }

    /// Mean raw engagement volume over the trailing window.
    pub fn trailing_engagement(&self, window: usize) -> f64 {
        mean(self.trailing(window).iter().map(|r| r.engagement_volume))
    }

    /// Mean fused score over the trailing window.
    pub fn trailing_fused(&self, window: usize) -> f64 {
        mean(self.trailing(window).iter().map(|r| r.fused_score))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Running min/max over observed values.
#[derive(Debug, Clone, Copy, Default)]
struct Range {
    bounds: Option<(f64, f64)>,
}

impl Range {
    fn observe(&mut self, v: f64) {
        self.bounds = Some(match self.bounds {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }

    /// Map into [0, 1]. A degenerate range maps everything to 0 when the
    /// only observed value is 0, otherwise to 1.
    fn normalize(&self, v: f64) -> f64 {
        match self.bounds {
            None => 0.0,
            Some((lo, hi)) if hi > lo => ((v - lo) / (hi - lo)).clamp(0.0, 1.0),
            Some((_, hi)) => {
                if hi == 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

/// Percent change from `prev` to `cur`, `None` when `prev` is zero.
pub fn percent_change(prev: f64, cur: f64) -> Option<f64> {
    if prev == 0.0 {
        None
    } else {
        Some((cur - prev) / prev * 100.0)
    }
}

/// Fuse engagement and search demand into one signal per profiled cluster.
pub fn fuse(
    profiles: &[ClusterProfile],
    engagement: &[EngagementPoint],
    search: &SearchIndex,
    config: &FusionConfig,
) -> Vec<TrendSignal> {
    let mut eng_by_cluster: HashMap<&str, BTreeMap<Month, (u32, f64)>> = HashMap::new();
    for p in engagement {
        eng_by_cluster
            .entry(p.cluster_id.as_str())
            .or_default()
            .insert(p.month, (p.post_count, p.engagement_sum));
    }

    struct Draft {
        matched: Vec<String>,
        search_by_month: BTreeMap<Month, f64>,
    }

    let drafts: Vec<Draft> = profiles
        .iter()
        .map(|profile| {
            let matched = search.matching_queries(&profile.fingerprint, config.match_keywords);
            let search_by_month = search.impressions_by_month(&matched);
            Draft {
                matched,
                search_by_month,
            }
        })
        .collect();

    // Axis: every month between the earliest and latest observation.
    let observed = eng_by_cluster
        .values()
        .flat_map(|m| m.keys().copied())
        .chain(drafts.iter().flat_map(|d| d.search_by_month.keys().copied()));
    let (first, last) = observed.fold((None, None), |(lo, hi): (Option<Month>, Option<Month>), m| {
        (Some(lo.map_or(m, |x| x.min(m))), Some(hi.map_or(m, |x| x.max(m))))
    });
    let axis = match (first, last) {
        (Some(a), Some(b)) => Month::range(a, b),
        _ => Vec::new(),
    };

    let mut eng_range = Range::default();
    let mut search_range = Range::default();
    for (profile, draft) in profiles.iter().zip(&drafts) {
        let eng = eng_by_cluster.get(profile.cluster_id.as_str());
        for month in &axis {
            eng_range.observe(eng.and_then(|m| m.get(month)).map_or(0.0, |(_, v)| *v));
            if !draft.matched.is_empty() {
                search_range.observe(draft.search_by_month.get(month).copied().unwrap_or(0.0));
            }
        }
    }

    debug!(
        clusters = profiles.len(),
        months = axis.len(),
        "Fusing engagement and search signals"
    );

    profiles
        .iter()
        .zip(drafts)
        .map(|(profile, draft)| {
            let eng = eng_by_cluster.get(profile.cluster_id.as_str());
            let unmatched = draft.matched.is_empty();
            let mut rows: Vec<TrendRow> = Vec::with_capacity(axis.len());

            for month in &axis {
                let (post_count, engagement_volume) = eng.and_then(|m| m.get(month)).copied().unwrap_or((0, 0.0));
                let search_impressions = draft.search_by_month.get(month).copied().unwrap_or(0.0);
                let engagement_norm = eng_range.normalize(engagement_volume);
                let search_norm = if unmatched {
                    0.0
                } else {
                    search_range.normalize(search_impressions)
                };
                let fused_score = config.engagement_weight * engagement_norm + config.search_weight * search_norm;

                let mom_change = rows.last().and_then(|prev| percent_change(prev.fused_score, fused_score));
                let window_start = rows.len().saturating_sub(config.moving_average_window.saturating_sub(1));
                let moving_avg_3m = mean(
                    rows[window_start..]
                        .iter()
                        .map(|r| r.fused_score)
                        .chain(std::iter::once(fused_score)),
                );

                rows.push(TrendRow {
                    cluster_id: profile.cluster_id.clone(),
                    month: *month,
                    post_count,
                    engagement_volume,
                    search_impressions,
                    engagement_norm,
                    search_norm,
                    fused_score,
                    mom_change,
                    moving_avg_3m,
                });
            }

            let dominant_query = search.dominant_query(&draft.matched);
            let aio_present = search.aio_present(dominant_query.as_deref(), &profile.fingerprint);

            TrendSignal {
                cluster_id: profile.cluster_id.clone(),
                rows,
                matched_queries: draft.matched,
                dominant_query,
                search_unmatched: unmatched,
                aio_present,
            }
        })
        .collect()
}

// Search-console demand and AI-overview presence, joined to clusters through
// their fingerprint keywords.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::monthly::Month;
use crate::topics::Fingerprint;

/// One monthly search-console row for a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRow {
    pub query: String,
    pub month: Month,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}

/// One-shot AI-overview observation for a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AioSnapshot {
    pub query: String,
    pub aio_present: bool,
}

/// Per-query totals, used for prompts and dominant-query selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTotals {
    pub query: String,
    pub impressions: f64,
    pub clicks: f64,
}

impl QueryTotals {
    pub fn ctr(&self) -> f64 {
        if self.impressions > 0.0 {
            self.clicks / self.impressions
        } else {
            0.0
        }
    }
}

/// Search rows indexed by query, with duplicate (query, month) rows summed.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    /// query -> month -> (impressions, clicks)
    monthly: BTreeMap<String, BTreeMap<Month, (f64, f64)>>,
    aio: HashMap<String, bool>,
}

impl SearchIndex {
    pub fn new(rows: &[SearchRow], snapshots: &[AioSnapshot]) -> Self {
        let mut monthly: BTreeMap<String, BTreeMap<Month, (f64, f64)>> = BTreeMap::new();
        for row in rows {
            let entry = monthly
                .entry(row.query.clone())
                .or_default()
                .entry(row.month)
                .or_insert((0.0, 0.0));
            entry.0 += row.impressions;
            entry.1 += row.clicks;
        }
        let mut aio = HashMap::new();
        for snap in snapshots {
            // A query seen with an overview at any point counts as present.
            *aio.entry(snap.query.to_lowercase()).or_insert(false) |= snap.aio_present;
        }
        Self { monthly, aio }
    }

    pub fn is_empty(&self) -> bool {
        self.monthly.is_empty()
    }

    /// Queries containing any of the fingerprint's top `n` keywords
    /// (case-insensitive substring), sorted.
    pub fn matching_queries(&self, fingerprint: &Fingerprint, n: usize) -> Vec<String> {
        let keywords: Vec<String> = fingerprint.top_terms(n).map(str::to_lowercase).collect();
        if keywords.is_empty() {
            return Vec::new();
        }
        self.monthly
            .keys()
            .filter(|q| {
                let lower = q.to_lowercase();
                keywords.iter().any(|kw| lower.contains(kw.as_str()))
            })
            .cloned()
            .collect()
    }

    /// Summed impressions per month across `queries`.
    pub fn impressions_by_month(&self, queries: &[String]) -> BTreeMap<Month, f64> {
        let mut out = BTreeMap::new();
        for q in queries {
            if let Some(months) = self.monthly.get(q) {
                for (month, (impressions, _)) in months {
                    *out.entry(*month).or_insert(0.0) += impressions;
                }
            }
        }
        out
    }

    pub fn totals(&self, query: &str) -> Option<QueryTotals> {
        self.monthly.get(query).map(|months| {
            let (impressions, clicks) = months
                .values()
                .fold((0.0, 0.0), |(i, c), (mi, mc)| (i + mi, c + mc));
            QueryTotals {
                query: query.to_string(),
                impressions,
                clicks,
            }
        })
    }

    /// Matched queries by total impressions, highest first (ties by query).
    pub fn ranked_totals(&self, queries: &[String]) -> Vec<QueryTotals> {
        let mut totals: Vec<QueryTotals> = queries.iter().filter_map(|q| self.totals(q)).collect();
        totals.sort_by(|a, b| b.impressions.total_cmp(&a.impressions).then_with(|| a.query.cmp(&b.query)));
        totals
    }

    /// The highest-impression matched query.
    pub fn dominant_query(&self, queries: &[String]) -> Option<String> {
        self.ranked_totals(queries).into_iter().next().map(|t| t.query)
    }

    /// AI-overview presence for a cluster: the dominant matched query's
    /// snapshot if there is one; otherwise whether any snapshot query
    /// containing the top fingerprint keyword shows an overview.
    pub fn aio_present(&self, dominant_query: Option<&str>, fingerprint: &Fingerprint) -> bool {
        if let Some(q) = dominant_query {
            return self.aio.get(&q.to_lowercase()).copied().unwrap_or(false);
        }
        let Some(top) = fingerprint.top_keyword() else {
            return false;
        };
        let top = top.to_lowercase();
        self.aio.iter().any(|(q, present)| *present && q.contains(top.as_str()))
    }

    pub fn months(&self) -> impl Iterator<Item = Month> + '_ {
        self.monthly.values().flat_map(|m| m.keys().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::ScoredKeyword;

    fn row(query: &str, month: &str, impressions: f64, clicks: f64) -> SearchRow {
        SearchRow {
            query: query.to_string(),
            month: month.parse().unwrap(),
            impressions,
            clicks,
            ctr: 0.0,
            position: 0.0,
        }
    }

    fn fp(terms: &[&str]) -> Fingerprint {
        Fingerprint {
            cluster_id: "cl-x".to_string(),
            keywords: terms
                .iter()
                .enumerate()
                .map(|(i, t)| ScoredKeyword {
                    term: t.to_string(),
                    score: 1.0 / (i + 1) as f64,
                })
                .collect(),
        }
    }

    #[test]
    fn test_matching_is_case_insensitive_substring() {
        let index = SearchIndex::new(
            &[
                row("Spring Asparagus Recipes", "2025-03", 100.0, 5.0),
                row("fridge organization ideas", "2025-03", 50.0, 2.0),
            ],
            &[],
        );
        let matched = index.matching_queries(&fp(&["asparagus"]), 10);
        assert_eq!(matched, vec!["Spring Asparagus Recipes"]);
    }

    #[test]
    fn test_only_top_n_keywords_match() {
        let index = SearchIndex::new(&[row("crisper drawer", "2025-03", 10.0, 1.0)], &[]);
        assert!(index.matching_queries(&fp(&["fridge", "crisper"]), 1).is_empty());
        assert_eq!(index.matching_queries(&fp(&["fridge", "crisper"]), 2).len(), 1);
    }

    #[test]
    fn test_dominant_query_and_aio() {
        let index = SearchIndex::new(
            &[
                row("asparagus soup", "2025-03", 40.0, 1.0),
                row("asparagus soup", "2025-04", 40.0, 1.0),
                row("asparagus tart", "2025-04", 60.0, 6.0),
            ],
            &[
                AioSnapshot {
                    query: "asparagus soup".to_string(),
                    aio_present: true,
                },
                AioSnapshot {
                    query: "asparagus tart".to_string(),
                    aio_present: false,
                },
            ],
        );
        let matched = index.matching_queries(&fp(&["asparagus"]), 10);
        let dominant = index.dominant_query(&matched);
        assert_eq!(dominant.as_deref(), Some("asparagus soup"));
        assert!(index.aio_present(dominant.as_deref(), &fp(&["asparagus"])));

        let by_month = index.impressions_by_month(&matched);
        assert_eq!(by_month.len(), 2);
        assert!((by_month[&Month::new(2025, 4).unwrap()] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_aio_falls_back_to_top_keyword_without_matches() {
        let index = SearchIndex::new(
            &[],
            &[AioSnapshot {
                query: "Best Radish Salad".to_string(),
                aio_present: true,
            }],
        );
        assert!(index.aio_present(None, &fp(&["radish"])));
        assert!(!index.aio_present(None, &fp(&["kale"])));
        assert!(!index.aio_present(None, &fp(&[])));
    }

    #[test]
    fn test_ctr() {
        let t = QueryTotals {
            query: "q".to_string(),
            impressions: 200.0,
            clicks: 10.0,
        };
        assert!((t.ctr() - 0.05).abs() < 1e-12);
    }
}

// Calendar-month bucketing and per-cluster engagement aggregation.
//
// All timestamps are UTC, so a month bucket is just (year, month) of the UTC
// date.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clustering::Partition;
use crate::store::Document;

/// A UTC calendar month. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(ts: &DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `start` to `end`, inclusive. Empty if `start > end`.
    pub fn range(start: Month, end: Month) -> Vec<Month> {
        let mut out = Vec::new();
        let mut cur = start;
        while cur <= end {
            out.push(cur);
            cur = cur.next();
        }
        out
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = String;

    /// Accepts `YYYY-MM`, `YYYY-MM-DD` or a full RFC 3339 timestamp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(Month::of(&ts.with_timezone(&Utc)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self {
                year: date.year(),
                month: date.month(),
            });
        }
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid month {s:?}, expected YYYY-MM"))?;
        let year: i32 = y.parse().map_err(|_| format!("invalid year in {s:?}"))?;
        let month: u32 = m.parse().map_err(|_| format!("invalid month in {s:?}"))?;
        Month::new(year, month).ok_or_else(|| format!("month out of range in {s:?}"))
    }
}

impl TryFrom<String> for Month {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(m: Month) -> Self {
        m.to_string()
    }
}

/// Monthly engagement aggregate for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementPoint {
    pub cluster_id: String,
    pub month: Month,
    pub post_count: u32,
    /// Summed engagement weight; the volume fed into fusion.
    pub engagement_sum: f64,
    pub engagement_avg: f64,
}

/// Aggregate member documents of every non-noise cluster by UTC month. Only
/// months with at least one post are emitted; the fuser zero-fills gaps.
pub fn aggregate_engagement(partition: &Partition, docs: &[Document]) -> Vec<EngagementPoint> {
    let by_id: HashMap<&str, &Document> = docs.iter().map(|d| (d.doc_id.as_str(), d)).collect();
    let mut points = Vec::new();

    for cluster in &partition.clusters {
        let mut buckets: BTreeMap<Month, (u32, f64)> = BTreeMap::new();
        for doc in cluster.member_doc_ids.iter().filter_map(|id| by_id.get(id.as_str())) {
            let entry = buckets.entry(Month::of(&doc.timestamp)).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += doc.engagement_weight;
        }
        points.extend(buckets.into_iter().map(|(month, (count, sum))| EngagementPoint {
            cluster_id: cluster.cluster_id.clone(),
            month,
            post_count: count,
            engagement_sum: sum,
            engagement_avg: sum / count as f64,
        }));
    }

    points
}

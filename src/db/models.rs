// Data models — Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use serde::{Deserialize, Serialize};

/// Market state of a cluster for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    Emerging,
    Competitive,
    Saturated,
    Niche,
}

impl MarketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketState::Emerging => "Emerging",
            MarketState::Competitive => "Competitive",
            MarketState::Saturated => "Saturated",
            MarketState::Niche => "Niche",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Emerging" => Some(MarketState::Emerging),
            "Competitive" => Some(MarketState::Competitive),
            "Saturated" => Some(MarketState::Saturated),
            "Niche" => Some(MarketState::Niche),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run enrichment outcome for a non-noise cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrichmentStatus {
    /// A fresh record was produced and stored this run.
    Enriched,
    /// An existing record for the same content hash was reused.
    Cached,
    /// Every attempt failed; the cluster carries no record.
    Failed,
    /// Ranked outside the enrichment budget.
    NotSelected,
    /// The run was cancelled before this cluster was processed.
    Cancelled,
    /// Another run holds a live claim on the same cache key.
    InFlight,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::Cached => "cached",
            EnrichmentStatus::Failed => "enrichment_failed",
            EnrichmentStatus::NotSelected => "not_selected",
            EnrichmentStatus::Cancelled => "cancelled",
            EnrichmentStatus::InFlight => "in_flight",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enriched" => Some(EnrichmentStatus::Enriched),
            "cached" => Some(EnrichmentStatus::Cached),
            "enrichment_failed" => Some(EnrichmentStatus::Failed),
            "not_selected" => Some(EnrichmentStatus::NotSelected),
            "cancelled" => Some(EnrichmentStatus::Cancelled),
            "in_flight" => Some(EnrichmentStatus::InFlight),
            _ => None,
        }
    }

    /// Whether the cluster ends the run with a usable record.
    pub fn has_record(&self) -> bool {
        matches!(self, EnrichmentStatus::Enriched | EnrichmentStatus::Cached)
    }
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cached output of the enrichment step, keyed by (cluster_id, content_hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentRecord {
    pub cluster_id: String,
    pub content_hash: String,
    pub category: String,
    pub topic_title: String,
    pub primary_question: String,
    pub related_questions: Vec<String>,
    pub blog_angle: String,
    pub social_angle: String,
    /// Free text or a structured object, as returned.
    pub why_now: serde_json::Value,
    pub evidence_summary: String,
    pub model_name: String,
    pub model_version: String,
    pub created_at: String,
}

/// One pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// `running`, `completed`, `cancelled` or `failed`.
    pub status: String,
    /// Clustering parameters as JSON.
    pub params: String,
    pub document_count: u32,
    pub cluster_count: u32,
    pub noise_ratio: f64,
}

/// Market-state row joined with its cluster and enrichment outcome, for reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketStateRow {
    pub cluster_id: String,
    pub size: u32,
    pub state: MarketState,
    pub trailing_avg: f64,
    pub percentile: f64,
    pub direction: String,
    pub aio_present: bool,
    pub search_unmatched: bool,
    pub evaluated_at: String,
    pub enrichment_status: Option<EnrichmentStatus>,
    pub topic_title: Option<String>,
}

/// Per-run enrichment status row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatus {
    pub run_id: String,
    pub cluster_id: String,
    pub content_hash: Option<String>,
    pub status: EnrichmentStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Result of trying to claim a cache key before calling the enricher.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// A record already exists; reuse it.
    Hit(EnrichmentRecord),
    /// Another worker holds a live claim.
    InFlight,
    /// The caller now owns the key and should call the enricher.
    Claimed,
}

/// Result of storing a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// A record for the same key was already present and got overwritten.
    Replaced,
}

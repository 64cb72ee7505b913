// Enricher trait — the injected capability for the expensive brief-writing
// step.
//
// The engine only decides whether and when to call it, and never trusts its
// output before schema validation. Tests substitute a fake with scripted
// responses and no network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::signals::QueryTotals;

/// One month of a cluster's trend, as shown to the enricher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendSummary {
    pub month: String,
    pub post_count: u32,
    pub engagement_volume: f64,
    pub fused_score: f64,
}

/// AI-overview context for the cluster's dominant query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AioSummary {
    pub query: Option<String>,
    pub present: bool,
}

/// Everything the enricher gets to see for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentRequest {
    pub cluster_id: String,
    pub content_hash: String,
    pub representative_text: String,
    /// Other members nearest the centroid, closest first.
    #[serde(default)]
    pub supporting_texts: Vec<String>,
    pub fingerprint: Vec<String>,
    /// Most recent months, oldest first.
    pub monthly_trend_summary: Vec<TrendSummary>,
    /// Matched queries by impressions, highest first.
    pub matched_search_summary: Vec<QueryTotals>,
    pub aio_summary: Option<AioSummary>,
}

/// Unvalidated enricher output plus the model that produced it.
#[derive(Debug, Clone)]
pub struct EnrichmentResponse {
    pub payload: serde_json::Value,
    pub model_name: String,
    pub model_version: String,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    /// Submit one request. Transport failures come back as
    /// `EngineError::ExternalCall`; the payload shape is checked by the caller.
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse, EngineError>;
}

/// Enricher used when enrichment is switched off. Errors if actually called,
/// so a misconfigured run never records fabricated briefs.
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichmentResponse, EngineError> {
        Err(EngineError::ExternalCall(
            "NoopEnricher should never be called, configure OPENAI_API_KEY to enable enrichment".to_string(),
        ))
    }
}

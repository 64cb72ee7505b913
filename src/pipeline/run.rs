// One end-to-end run: cluster -> extract -> fuse -> classify -> persist -> enrich.
//
// All normalization is scoped to the documents of this run. Nothing here
// reads process-wide state; the run id, evaluation time and cancel flag come
// in through `RunContext`, and tunables through `RunSettings`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::enrich::{enrich_clusters, EnrichOptions, EnrichSummary};
use super::prioritize;
use crate::clustering::{self, ClusterParams, Partition};
use crate::db::models::{ClusterStatus, EnrichmentStatus, RunRecord};
use crate::db::Database;
use crate::enrichment::{content_hash, AioSummary, Enricher, EnrichmentRequest, TrendSummary};
use crate::error::EngineError;
use crate::scoring::market::{assess, ClassifierThresholds, MarketAssessment};
use crate::signals::{aggregate_engagement, fuse, AioSnapshot, FusionConfig, SearchIndex, SearchRow, TrendSignal};
use crate::store::Document;
use crate::topics::{self, Assignment, Extraction, TfIdfExtractor};

/// Algorithm label stored with each cluster row.
pub const ALGORITHM: &str = "hdbscan";

/// Matched queries shown to the enricher.
const SEARCH_SUMMARY_QUERIES: usize = 5;

/// Posts shown next to the representative.
const SUPPORTING_SAMPLES: usize = 4;

/// Identity and control handle of a single run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    /// Timestamp written on every market-state row of the run.
    pub evaluated_at: DateTime<Utc>,
    /// Set to stop the run between clusters of the enrichment loop.
    pub cancel: Arc<AtomicBool>,
}

impl RunContext {
    /// A fresh context; without an explicit id one is derived from the clock.
    pub fn new(run_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.unwrap_or_else(|| format!("run-{}", now.format("%Y%m%dT%H%M%S%.3fZ"))),
            evaluated_at: now,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Every tunable of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub cluster: ClusterParams,
    pub fingerprint_size: usize,
    pub fusion: FusionConfig,
    pub thresholds: ClassifierThresholds,
    pub enrich: EnrichOptions,
    /// Persist everything but mark all clusters `not_selected`.
    pub skip_enrichment: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            cluster: ClusterParams::default(),
            fingerprint_size: 10,
            fusion: FusionConfig::default(),
            thresholds: ClassifierThresholds::default(),
            enrich: EnrichOptions::default(),
            skip_enrichment: false,
        }
    }
}

/// The data a run consumes.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub documents: Vec<Document>,
    pub search_rows: Vec<SearchRow>,
    pub aio_snapshots: Vec<AioSnapshot>,
}

/// Final state of a run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }
}

/// Everything computed for a run before anything is written.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub partition: Partition,
    pub extraction: Extraction,
    pub signals: Vec<TrendSignal>,
    pub assessments: Vec<MarketAssessment>,
    /// One per profiled cluster, in partition order.
    pub requests: Vec<EnrichmentRequest>,
}

impl Analysis {
    pub fn request(&self, cluster_id: &str) -> Option<&EnrichmentRequest> {
        self.requests.iter().find(|r| r.cluster_id == cluster_id)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub analysis: Analysis,
    pub enrichment: EnrichSummary,
    pub not_selected: usize,
}

/// Nearest non-representative members of `cluster_id`, closest first.
fn supporting_texts(cluster_id: &str, assignments: &[Assignment], texts: &HashMap<&str, &str>) -> Vec<String> {
    let mut nearest: Vec<&Assignment> = assignments
        .iter()
        .filter(|a| a.cluster_id == cluster_id && !a.is_representative)
        .collect();
    nearest.sort_by(|a, b| {
        a.distance_to_centroid
            .total_cmp(&b.distance_to_centroid)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    nearest
        .into_iter()
        .filter_map(|a| texts.get(a.doc_id.as_str()).copied())
        .filter(|t| !t.trim().is_empty())
        .take(SUPPORTING_SAMPLES)
        .map(str::to_string)
        .collect()
}

fn build_request(
    profile: &topics::ClusterProfile,
    members: &[String],
    assignments: &[Assignment],
    signal: Option<&TrendSignal>,
    search: &SearchIndex,
    texts: &HashMap<&str, &str>,
    window: usize,
) -> EnrichmentRequest {
    let fingerprint = profile.fingerprint.terms();
    let hash = content_hash(members, &fingerprint, &profile.representative_doc_id);

    let monthly_trend_summary = signal
        .map(|s| {
            s.trailing(window)
                .iter()
                .map(|r| TrendSummary {
                    month: r.month.to_string(),
                    post_count: r.post_count,
                    engagement_volume: r.engagement_volume,
                    fused_score: r.fused_score,
                })
                .collect()
        })
        .unwrap_or_default();

    let matched_search_summary = signal
        .map(|s| {
            let mut totals = search.ranked_totals(&s.matched_queries);
            totals.truncate(SEARCH_SUMMARY_QUERIES);
            totals
        })
        .unwrap_or_default();

    let aio_summary = if search.is_empty() {
        None
    } else {
        signal.map(|s| AioSummary {
            query: s.dominant_query.clone(),
            present: s.aio_present,
        })
    };

    EnrichmentRequest {
        cluster_id: profile.cluster_id.clone(),
        content_hash: hash,
        representative_text: texts
            .get(profile.representative_doc_id.as_str())
            .map(|t| t.to_string())
            .unwrap_or_default(),
        supporting_texts: supporting_texts(&profile.cluster_id, assignments, texts),
        fingerprint,
        monthly_trend_summary,
        matched_search_summary,
        aio_summary,
    }
}

/// Run every computation of a run without touching storage or the network.
///
/// Fails only with clustering-stage errors.
pub fn analyze(settings: &RunSettings, inputs: &RunInputs) -> Result<Analysis, EngineError> {
    let docs = &inputs.documents;
    let partition = clustering::cluster(docs, &settings.cluster)?;

    let extractor = TfIdfExtractor::new(settings.fingerprint_size);
    let extraction = topics::extract(&partition, docs, &extractor);

    let engagement = aggregate_engagement(&partition, docs);
    let search = SearchIndex::new(&inputs.search_rows, &inputs.aio_snapshots);
    let signals = fuse(&extraction.profiles, &engagement, &search, &settings.fusion);
    let assessments = assess(&signals, &settings.thresholds);

    let texts: HashMap<&str, &str> = docs.iter().map(|d| (d.doc_id.as_str(), d.text.as_str())).collect();
    let by_cluster: HashMap<&str, &TrendSignal> = signals.iter().map(|s| (s.cluster_id.as_str(), s)).collect();

    let requests = extraction
        .profiles
        .iter()
        .filter_map(|profile| {
            let cluster = partition.cluster(&profile.cluster_id)?;
            Some(build_request(
                profile,
                &cluster.member_doc_ids,
                &extraction.assignments,
                by_cluster.get(profile.cluster_id.as_str()).copied(),
                &search,
                &texts,
                settings.thresholds.window,
            ))
        })
        .collect();

    Ok(Analysis {
        partition,
        extraction,
        signals,
        assessments,
        requests,
    })
}

#[derive(Serialize)]
struct StoredParams<'a> {
    cluster: &'a ClusterParams,
    fingerprint_size: usize,
    fusion: &'a FusionConfig,
    thresholds: &'a ClassifierThresholds,
    enrich_budget: usize,
}

fn run_record(ctx: &RunContext, settings: &RunSettings, started_at: &str, analysis: Option<&Analysis>) -> Result<RunRecord> {
    let params = serde_json::to_string(&StoredParams {
        cluster: &settings.cluster,
        fingerprint_size: settings.fingerprint_size,
        fusion: &settings.fusion,
        thresholds: &settings.thresholds,
        enrich_budget: settings.enrich.budget,
    })?;

    Ok(RunRecord {
        run_id: ctx.run_id.clone(),
        started_at: started_at.to_string(),
        finished_at: None,
        status: RunStatus::Running.as_str().to_string(),
        params,
        document_count: analysis.map(|a| a.partition.total_documents() as u32).unwrap_or(0),
        cluster_count: analysis.map(|a| a.partition.clusters.len() as u32).unwrap_or(0),
        noise_ratio: analysis.map(|a| a.partition.noise_ratio()).unwrap_or(0.0),
    })
}

async fn persist(db: &dyn Database, ctx: &RunContext, analysis: &Analysis) -> Result<()> {
    let run_id = ctx.run_id.as_str();
    db.save_clusters(run_id, &analysis.partition, ALGORITHM)
        .await
        .context("Failed to persist clusters")?;
    db.save_assignments(run_id, &analysis.extraction.assignments).await?;
    db.save_fingerprints(run_id, &analysis.extraction.profiles).await?;
    db.save_trend_rows(run_id, &analysis.signals).await?;
    db.save_market_states(run_id, &analysis.assessments, &ctx.evaluated_at.to_rfc3339())
        .await?;
    Ok(())
}

/// Execute a full run and persist every output.
///
/// Clustering-stage failures mark the run `failed` and are returned.
/// Enrichment failures are recorded per cluster and the run still completes.
pub async fn execute(
    ctx: &RunContext,
    settings: &RunSettings,
    inputs: &RunInputs,
    db: &dyn Database,
    enricher: &dyn Enricher,
) -> Result<RunReport> {
    let started_at = Utc::now().to_rfc3339();
    let stale = db.clear_run_outputs(&ctx.run_id).await?;
    if stale > 0 {
        info!(run_id = %ctx.run_id, rows = stale, "Run id reused, cleared its previous outputs");
    }
    db.insert_run(&run_record(ctx, settings, &started_at, None)?).await?;

    let analysis = match analyze(settings, inputs) {
        Ok(a) => a,
        Err(e) => {
            warn!(run_id = %ctx.run_id, error = %e, "Run failed during clustering");
            db.finish_run(&ctx.run_id, RunStatus::Failed.as_str(), &Utc::now().to_rfc3339())
                .await?;
            return Err(e.into());
        }
    };

    db.insert_run(&run_record(ctx, settings, &started_at, Some(&analysis))?)
        .await?;
    persist(db, ctx, &analysis).await?;

    let ranked = prioritize::rank(&analysis.partition, &analysis.signals, settings.thresholds.window);
    let budget = if settings.skip_enrichment {
        0
    } else {
        settings.enrich.budget
    };
    let (chosen, rest) = prioritize::select(ranked, budget);

    for r in &rest {
        db.set_enrichment_status(&ClusterStatus {
            run_id: ctx.run_id.clone(),
            cluster_id: r.cluster_id.clone(),
            content_hash: analysis.request(&r.cluster_id).map(|q| q.content_hash.clone()),
            status: EnrichmentStatus::NotSelected,
            attempts: 0,
            error: None,
        })
        .await?;
    }

    let mut requests = Vec::with_capacity(chosen.len());
    for r in &chosen {
        match analysis.request(&r.cluster_id) {
            Some(request) => requests.push(request.clone()),
            None => {
                warn!(cluster_id = %r.cluster_id, "Cluster has no representative document, cannot enrich");
                db.set_enrichment_status(&ClusterStatus {
                    run_id: ctx.run_id.clone(),
                    cluster_id: r.cluster_id.clone(),
                    content_hash: None,
                    status: EnrichmentStatus::Failed,
                    attempts: 0,
                    error: Some("no representative document".to_string()),
                })
                .await?;
            }
        }
    }

    let enrichment = enrich_clusters(db, enricher, &ctx.run_id, &requests, &settings.enrich, &ctx.cancel).await;

    let status = if ctx.is_cancelled() {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    db.finish_run(&ctx.run_id, status.as_str(), &Utc::now().to_rfc3339())
        .await?;

    info!(
        run_id = %ctx.run_id,
        status = status.as_str(),
        clusters = analysis.partition.clusters.len(),
        selected = requests.len(),
        not_selected = rest.len(),
        "Run finished"
    );

    Ok(RunReport {
        run_id: ctx.run_id.clone(),
        status,
        analysis,
        enrichment,
        not_selected: rest.len(),
    })
}

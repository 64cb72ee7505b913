// Enrichment pipeline: claim cache key -> call enricher -> validate -> store.
//
// Each selected cluster is handled independently. Failures are recorded
// against the cluster and never abort the batch. The only shared state is
// the database (claims are transactional) and the rate limiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::db::models::{ClaimOutcome, ClusterStatus, EnrichmentStatus, StoreOutcome};
use crate::db::Database;
use crate::enrichment::{enrich_with_retry, Enricher, EnrichmentRequest, EnrichmentSchema, RateLimiter, RetryPolicy};
use crate::error::EngineError;

/// Knobs for one enrichment batch.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Maximum number of clusters sent to the enricher per run.
    pub budget: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Client-side cap on enricher calls; 0 disables pacing.
    pub requests_per_second: f64,
    /// How long a claim blocks other runs before it is considered abandoned.
    pub claim_lease: Duration,
    pub schema: EnrichmentSchema,
    pub show_progress: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            budget: 50,
            concurrency: 4,
            retry: RetryPolicy::default(),
            requests_per_second: 2.0,
            claim_lease: Duration::from_secs(15 * 60),
            schema: EnrichmentSchema::default(),
            show_progress: false,
        }
    }
}

/// Counts of per-cluster outcomes for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub enriched: usize,
    pub cached: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub cancelled: usize,
    /// Total enricher calls made, retries included.
    pub external_calls: u32,
}

impl EnrichSummary {
    fn record(&mut self, status: EnrichmentStatus, attempts: u32) {
        self.external_calls += attempts;
        match status {
            EnrichmentStatus::Enriched => self.enriched += 1,
            EnrichmentStatus::Cached => self.cached += 1,
            EnrichmentStatus::Failed => self.failed += 1,
            EnrichmentStatus::InFlight => self.in_flight += 1,
            EnrichmentStatus::Cancelled => self.cancelled += 1,
            EnrichmentStatus::NotSelected => {}
        }
    }
}

struct Outcome {
    status: EnrichmentStatus,
    attempts: u32,
    error: Option<String>,
}

impl Outcome {
    fn of(status: EnrichmentStatus) -> Self {
        Self {
            status,
            attempts: 0,
            error: None,
        }
    }
}

/// Shared, read-only context for the workers of one batch.
struct Batch<'a> {
    db: &'a dyn Database,
    enricher: &'a dyn Enricher,
    run_id: &'a str,
    options: &'a EnrichOptions,
    limiter: RateLimiter,
    cancel: &'a AtomicBool,
}

impl Batch<'_> {
    async fn process(&self, request: &EnrichmentRequest) -> Result<Outcome> {
        let cluster_id = request.cluster_id.as_str();
        let content_hash = request.content_hash.as_str();

        if self.cancel.load(Ordering::SeqCst) {
            return Ok(Outcome::of(EnrichmentStatus::Cancelled));
        }

        let lease = chrono::Duration::from_std(self.options.claim_lease)?;
        match self
            .db
            .claim_enrichment(cluster_id, content_hash, self.run_id, Utc::now(), lease)
            .await?
        {
            ClaimOutcome::Hit(_) => {
                info!(cluster_id, content_hash, "Enrichment cache hit");
                Ok(Outcome::of(EnrichmentStatus::Cached))
            }
            ClaimOutcome::InFlight => {
                info!(cluster_id, content_hash, "Enrichment already in flight elsewhere, skipping");
                Ok(Outcome::of(EnrichmentStatus::InFlight))
            }
            ClaimOutcome::Claimed => {
                let attempted = enrich_with_retry(
                    self.enricher,
                    request,
                    &self.options.schema,
                    &self.options.retry,
                    &self.limiter,
                )
                .await;

                match attempted.result {
                    Ok(record) => {
                        let stored = match self.db.store_enrichment(&record).await {
                            Ok(stored) => stored,
                            Err(e) => {
                                warn!(cluster_id, content_hash, error = %e, "Failed to store enrichment record");
                                // Free the key so the next run can try again
                                if let Err(release) = self.db.release_claim(cluster_id, content_hash, self.run_id).await {
                                    warn!(cluster_id, content_hash, error = %release, "Failed to release enrichment claim");
                                }
                                return Ok(Outcome {
                                    status: EnrichmentStatus::Failed,
                                    attempts: attempted.attempts,
                                    error: Some(format!("failed to store enrichment record: {e}")),
                                });
                            }
                        };
                        if stored == StoreOutcome::Replaced {
                            let err = EngineError::CacheConsistency {
                                cluster_id: cluster_id.to_string(),
                                content_hash: content_hash.to_string(),
                            };
                            warn!(cluster_id, content_hash, error = %err, "Last writer wins");
                        }
                        info!(
                            cluster_id,
                            content_hash,
                            attempts = attempted.attempts,
                            category = %record.category,
                            "Cluster enriched"
                        );
                        Ok(Outcome {
                            status: EnrichmentStatus::Enriched,
                            attempts: attempted.attempts,
                            error: None,
                        })
                    }
                    Err(err) => {
                        warn!(
                            cluster_id,
                            content_hash,
                            attempts = attempted.attempts,
                            error = %err,
                            "Enrichment failed, continuing with other clusters"
                        );
                        self.db.release_claim(cluster_id, content_hash, self.run_id).await?;
                        Ok(Outcome {
                            status: EnrichmentStatus::Failed,
                            attempts: attempted.attempts,
                            error: Some(err.to_string()),
                        })
                    }
                }
            }
        }
    }

    async fn process_and_record(&self, request: &EnrichmentRequest) -> Outcome {
        let outcome = match self.process(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    cluster_id = %request.cluster_id,
                    content_hash = %request.content_hash,
                    error = %e,
                    "Enrichment bookkeeping failed"
                );
                Outcome {
                    status: EnrichmentStatus::Failed,
                    attempts: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        let status = ClusterStatus {
            run_id: self.run_id.to_string(),
            cluster_id: request.cluster_id.clone(),
            content_hash: Some(request.content_hash.clone()),
            status: outcome.status,
            attempts: outcome.attempts,
            error: outcome.error.clone(),
        };
        if let Err(e) = self.db.set_enrichment_status(&status).await {
            warn!(cluster_id = %request.cluster_id, error = %e, "Failed to record enrichment status");
        }
        outcome
    }
}

/// Enrich the selected clusters, in priority order, with bounded concurrency.
///
/// Every request ends with exactly one status row for this run. Cancellation
/// is checked before each cluster starts; work already committed stays.
pub async fn enrich_clusters(
    db: &dyn Database,
    enricher: &dyn Enricher,
    run_id: &str,
    requests: &[EnrichmentRequest],
    options: &EnrichOptions,
    cancel: &AtomicBool,
) -> EnrichSummary {
    let batch = Batch {
        db,
        enricher,
        run_id,
        options,
        limiter: RateLimiter::new(options.requests_per_second),
        cancel,
    };

    let pb = if options.show_progress {
        let pb = ProgressBar::new(requests.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  Enriching [{bar:30}] {pos}/{len} ({eta})")
                .unwrap(),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let outcomes: Vec<Outcome> = stream::iter(requests.iter().map(|request| {
        let batch = &batch;
        let pb = &pb;
        async move {
            let outcome = batch.process_and_record(request).await;
            pb.inc(1);
            outcome
        }
    }))
    .buffer_unordered(options.concurrency.max(1))
    .collect()
    .await;

    pb.finish_and_clear();

    let mut summary = EnrichSummary::default();
    for outcome in outcomes {
        summary.record(outcome.status, outcome.attempts);
    }

    if summary.cancelled > 0 {
        warn!(cancelled = summary.cancelled, "Run cancelled, remaining clusters were not enriched");
    }
    info!(
        enriched = summary.enriched,
        cached = summary.cached,
        failed = summary.failed,
        in_flight = summary.in_flight,
        calls = summary.external_calls,
        "Enrichment batch complete"
    );

    summary
}

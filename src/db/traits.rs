// Database trait — async interface over the run store and enrichment cache.
//
// Implementor: SqliteDatabase (wraps rusqlite). Methods are async so the
// enrichment workers can share one `Arc<dyn Database>` across tasks.
//
// The trait mirrors the queries.rs function signatures.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::models::{ClaimOutcome, ClusterStatus, EnrichmentRecord, MarketStateRow, RunRecord, StoreOutcome};
use crate::clustering::Partition;
use crate::scoring::market::MarketAssessment;
use crate::signals::TrendSignal;
use crate::topics::{Assignment, ClusterProfile};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    async fn table_count(&self) -> Result<i64>;

    // --- Runs ---

    /// Insert or overwrite a run row.
    async fn insert_run(&self, run: &RunRecord) -> Result<()>;

    async fn finish_run(&self, run_id: &str, status: &str, finished_at: &str) -> Result<()>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Most recently started run, if any.
    async fn latest_run(&self) -> Result<Option<RunRecord>>;

    async fn run_count(&self) -> Result<i64>;

    // --- Run outputs ---

    /// Remove every stored output of a run (clusters, assignments,
    /// fingerprints, trend rows, market states, status rows).
    async fn clear_run_outputs(&self, run_id: &str) -> Result<usize>;

    async fn save_clusters(&self, run_id: &str, partition: &Partition, algorithm: &str) -> Result<()>;

    async fn save_assignments(&self, run_id: &str, assignments: &[Assignment]) -> Result<()>;

    async fn save_fingerprints(&self, run_id: &str, profiles: &[ClusterProfile]) -> Result<()>;

    async fn get_fingerprint(&self, run_id: &str, cluster_id: &str) -> Result<Option<Vec<String>>>;

    async fn save_trend_rows(&self, run_id: &str, signals: &[TrendSignal]) -> Result<()>;

    async fn save_market_states(
        &self,
        run_id: &str,
        assessments: &[MarketAssessment],
        evaluated_at: &str,
    ) -> Result<()>;

    async fn get_market_report(&self, run_id: &str) -> Result<Vec<MarketStateRow>>;

    // --- Enrichment cache ---

    async fn get_enrichment(&self, cluster_id: &str, content_hash: &str) -> Result<Option<EnrichmentRecord>>;

    /// Check the cache and, on a miss, take ownership of the key.
    async fn claim_enrichment(
        &self,
        cluster_id: &str,
        content_hash: &str,
        run_id: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ClaimOutcome>;

    /// Store a validated record and clear its claim.
    async fn store_enrichment(&self, record: &EnrichmentRecord) -> Result<StoreOutcome>;

    async fn release_claim(&self, cluster_id: &str, content_hash: &str, run_id: &str) -> Result<()>;

    async fn enrichment_record_count(&self) -> Result<i64>;

    // --- Enrichment status ---

    async fn set_enrichment_status(&self, status: &ClusterStatus) -> Result<()>;

    async fn get_enrichment_statuses(&self, run_id: &str) -> Result<Vec<ClusterStatus>>;
}

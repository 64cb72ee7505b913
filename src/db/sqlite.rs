// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across an .await on anything else.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{ClaimOutcome, ClusterStatus, EnrichmentRecord, MarketStateRow, RunRecord, StoreOutcome};
use super::traits::Database;
use crate::clustering::Partition;
use crate::scoring::market::MarketAssessment;
use crate::signals::TrendSignal;
use crate::topics::{Assignment, ClusterProfile};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::insert_run(&conn, run)
    }

    async fn finish_run(&self, run_id: &str, status: &str, finished_at: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::finish_run(&conn, run_id, status, finished_at)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock().await;
        super::queries::get_run(&conn, run_id)
    }

    async fn latest_run(&self) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock().await;
        super::queries::latest_run(&conn)
    }

    async fn run_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::run_count(&conn)
    }

    async fn clear_run_outputs(&self, run_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::clear_run_outputs(&conn, run_id)
    }

    async fn save_clusters(&self, run_id: &str, partition: &Partition, algorithm: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::save_clusters(&conn, run_id, partition, algorithm)
    }

    async fn save_assignments(&self, run_id: &str, assignments: &[Assignment]) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::save_assignments(&conn, run_id, assignments)
    }

    async fn save_fingerprints(&self, run_id: &str, profiles: &[ClusterProfile]) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::save_fingerprints(&conn, run_id, profiles)
    }

    async fn get_fingerprint(&self, run_id: &str, cluster_id: &str) -> Result<Option<Vec<String>>> {
        let conn = self.conn.lock().await;
        super::queries::get_fingerprint(&conn, run_id, cluster_id)
    }

    async fn save_trend_rows(&self, run_id: &str, signals: &[TrendSignal]) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::save_trend_rows(&conn, run_id, signals)
    }

    async fn save_market_states(
        &self,
        run_id: &str,
        assessments: &[MarketAssessment],
        evaluated_at: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::save_market_states(&conn, run_id, assessments, evaluated_at)
    }

    async fn get_market_report(&self, run_id: &str) -> Result<Vec<MarketStateRow>> {
        let conn = self.conn.lock().await;
        super::queries::get_market_report(&conn, run_id)
    }

    async fn get_enrichment(&self, cluster_id: &str, content_hash: &str) -> Result<Option<EnrichmentRecord>> {
        let conn = self.conn.lock().await;
        super::queries::get_enrichment(&conn, cluster_id, content_hash)
    }

    async fn claim_enrichment(
        &self,
        cluster_id: &str,
        content_hash: &str,
        run_id: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ClaimOutcome> {
        let conn = self.conn.lock().await;
        super::queries::claim_enrichment(&conn, cluster_id, content_hash, run_id, now, lease)
    }

    async fn store_enrichment(&self, record: &EnrichmentRecord) -> Result<StoreOutcome> {
        let conn = self.conn.lock().await;
        super::queries::store_enrichment(&conn, record)
    }

    async fn release_claim(&self, cluster_id: &str, content_hash: &str, run_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::release_claim(&conn, cluster_id, content_hash, run_id)
    }

    async fn enrichment_record_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::enrichment_record_count(&conn)
    }

    async fn set_enrichment_status(&self, status: &ClusterStatus) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::set_enrichment_status(&conn, status)
    }

    async fn get_enrichment_statuses(&self, run_id: &str) -> Result<Vec<ClusterStatus>> {
        let conn = self.conn.lock().await;
        super::queries::get_enrichment_statuses(&conn, run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::EnrichmentStatus;
    use std::sync::Arc;

    async fn test_db() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::create_tables(&conn).unwrap();
        SqliteDatabase::new(conn)
    }

    fn record(hash: &str) -> EnrichmentRecord {
        EnrichmentRecord {
            cluster_id: "cl-a".to_string(),
            content_hash: hash.to_string(),
            category: "SPRING_RECIPES".to_string(),
            topic_title: "Asparagus season".to_string(),
            primary_question: "How long to roast asparagus?".to_string(),
            related_questions: vec!["a".into(), "b".into(), "c".into()],
            blog_angle: "b".to_string(),
            social_angle: "s".to_string(),
            why_now: serde_json::json!("spring"),
            evidence_summary: "e".to_string(),
            model_name: "m".to_string(),
            model_version: "1".to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_trait_table_count() {
        let db = test_db().await;
        assert_eq!(db.table_count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_trait_enrichment_cache_roundtrip() {
        let db = test_db().await;
        let lease = Duration::minutes(5);
        let claimed = db
            .claim_enrichment("cl-a", "h1", "r1", Utc::now(), lease)
            .await
            .unwrap();
        assert_eq!(claimed, ClaimOutcome::Claimed);

        db.store_enrichment(&record("h1")).await.unwrap();
        let loaded = db.get_enrichment("cl-a", "h1").await.unwrap().unwrap();
        assert_eq!(loaded.why_now, serde_json::json!("spring"));
        assert!(db.get_enrichment("cl-a", "h2").await.unwrap().is_none());
        assert_eq!(db.enrichment_record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let db = Arc::new(test_db().await);
        let mut handles = Vec::new();
        for i in 0..8 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.claim_enrichment("cl-a", "h1", &format!("r{i}"), Utc::now(), Duration::minutes(5))
                    .await
                    .unwrap()
            }));
        }
        let mut claimed = 0;
        for h in handles {
            if h.await.unwrap() == ClaimOutcome::Claimed {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_trait_status_roundtrip() {
        let db = test_db().await;
        db.set_enrichment_status(&ClusterStatus {
            run_id: "r1".to_string(),
            cluster_id: "cl-b".to_string(),
            content_hash: None,
            status: EnrichmentStatus::NotSelected,
            attempts: 0,
            error: None,
        })
        .await
        .unwrap();
        let rows = db.get_enrichment_statuses("r1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, EnrichmentStatus::NotSelected);
    }
}

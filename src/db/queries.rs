// Database queries — CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::models::{
    ClaimOutcome, ClusterStatus, EnrichmentRecord, EnrichmentStatus, MarketState, MarketStateRow, RunRecord,
    StoreOutcome,
};
use crate::clustering::Partition;
use crate::scoring::market::MarketAssessment;
use crate::signals::TrendSignal;
use crate::topics::{Assignment, ClusterProfile};

// --- Runs ---

pub fn insert_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (run_id, started_at, finished_at, status, params, document_count, cluster_count, noise_ratio)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(run_id) DO UPDATE SET
            started_at = ?2, finished_at = ?3, status = ?4, params = ?5,
            document_count = ?6, cluster_count = ?7, noise_ratio = ?8",
        params![
            run.run_id,
            run.started_at,
            run.finished_at,
            run.status,
            run.params,
            run.document_count,
            run.cluster_count,
            run.noise_ratio
        ],
    )?;
    Ok(())
}

/// Mark a run finished with its final status.
pub fn finish_run(conn: &Connection, run_id: &str, status: &str, finished_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE runs SET status = ?2, finished_at = ?3 WHERE run_id = ?1",
        params![run_id, status, finished_at],
    )?;
    Ok(())
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        run_id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        status: row.get(3)?,
        params: row.get(4)?,
        document_count: row.get(5)?,
        cluster_count: row.get(6)?,
        noise_ratio: row.get(7)?,
    })
}

const RUN_COLUMNS: &str =
    "run_id, started_at, finished_at, status, params, document_count, cluster_count, noise_ratio";

pub fn get_run(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1");
    Ok(conn.query_row(&sql, params![run_id], row_to_run).optional()?)
}

pub fn latest_run(conn: &Connection) -> Result<Option<RunRecord>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY started_at DESC, run_id DESC LIMIT 1");
    Ok(conn.query_row(&sql, [], row_to_run).optional()?)
}

pub fn run_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?)
}

// --- Run outputs ---

/// Tables holding rows keyed by run_id, besides `runs` itself.
const RUN_OUTPUT_TABLES: [&str; 6] = [
    "cluster_assignments",
    "clusters",
    "fingerprints",
    "trend_rows",
    "market_states",
    "enrichment_status",
];

/// Delete every stored output of a run so a re-executed run id starts clean.
/// The `runs` row and the enrichment cache are left alone.
pub fn clear_run_outputs(conn: &Connection, run_id: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut deleted = 0;
    for table in RUN_OUTPUT_TABLES {
        deleted += tx.execute(&format!("DELETE FROM {table} WHERE run_id = ?1"), params![run_id])?;
    }
    tx.commit().context("Failed to clear run outputs")?;
    Ok(deleted)
}

/// Store every cluster of a partition, noise included.
pub fn save_clusters(conn: &Connection, run_id: &str, partition: &Partition, algorithm: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO clusters (run_id, cluster_id, is_noise, size, params, centroid, algorithm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for cluster in partition.all_clusters() {
            stmt.execute(params![
                run_id,
                cluster.cluster_id,
                cluster.is_noise,
                cluster.size() as i64,
                serde_json::to_string(&cluster.params)?,
                serde_json::to_string(&cluster.centroid)?,
                algorithm,
            ])?;
        }
    }
    tx.commit().context("Failed to save clusters")?;
    Ok(())
}

pub fn save_assignments(conn: &Connection, run_id: &str, assignments: &[Assignment]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO cluster_assignments
                (run_id, doc_id, cluster_id, distance_to_centroid, is_representative)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for a in assignments {
            stmt.execute(params![
                run_id,
                a.doc_id,
                a.cluster_id,
                a.distance_to_centroid,
                a.is_representative
            ])?;
        }
    }
    tx.commit().context("Failed to save cluster assignments")?;
    Ok(())
}

pub fn save_fingerprints(conn: &Connection, run_id: &str, profiles: &[ClusterProfile]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO fingerprints (run_id, cluster_id, keywords) VALUES (?1, ?2, ?3)",
        )?;
        for p in profiles {
            stmt.execute(params![
                run_id,
                p.cluster_id,
                serde_json::to_string(&p.fingerprint.terms())?
            ])?;
        }
    }
    tx.commit().context("Failed to save fingerprints")?;
    Ok(())
}

pub fn get_fingerprint(conn: &Connection, run_id: &str, cluster_id: &str) -> Result<Option<Vec<String>>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT keywords FROM fingerprints WHERE run_id = ?1 AND cluster_id = ?2",
            params![run_id, cluster_id],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|j| serde_json::from_str(&j).context("Corrupt fingerprint JSON"))
        .transpose()
}

pub fn save_trend_rows(conn: &Connection, run_id: &str, signals: &[TrendSignal]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO trend_rows
                (run_id, cluster_id, month, post_count, engagement_volume, search_impressions,
                 engagement_norm, search_norm, fused_score, mom_change, moving_avg_3m)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for row in signals.iter().flat_map(|s| &s.rows) {
            stmt.execute(params![
                run_id,
                row.cluster_id,
                row.month.to_string(),
                row.post_count,
                row.engagement_volume,
                row.search_impressions,
                row.engagement_norm,
                row.search_norm,
                row.fused_score,
                row.mom_change,
                row.moving_avg_3m,
            ])?;
        }
    }
    tx.commit().context("Failed to save trend rows")?;
    Ok(())
}

pub fn save_market_states(
    conn: &Connection,
    run_id: &str,
    assessments: &[MarketAssessment],
    evaluated_at: &str,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO market_states
                (run_id, cluster_id, state, trailing_avg, percentile, direction,
                 aio_present, search_unmatched, evaluated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for a in assessments {
            stmt.execute(params![
                run_id,
                a.cluster_id,
                a.state.as_str(),
                a.trailing_avg,
                a.percentile,
                a.direction.as_str(),
                a.aio_present,
                a.search_unmatched,
                evaluated_at,
            ])?;
        }
    }
    tx.commit().context("Failed to save market states")?;
    Ok(())
}

/// Market states of a run joined with cluster size and enrichment outcome,
/// largest clusters first.
pub fn get_market_report(conn: &Connection, run_id: &str) -> Result<Vec<MarketStateRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.cluster_id, c.size, m.state, m.trailing_avg, m.percentile, m.direction,
                m.aio_present, m.search_unmatched, m.evaluated_at, s.status, r.topic_title
         FROM market_states m
         JOIN clusters c ON c.run_id = m.run_id AND c.cluster_id = m.cluster_id
         LEFT JOIN enrichment_status s ON s.run_id = m.run_id AND s.cluster_id = m.cluster_id
         LEFT JOIN enrichment_records r ON r.cluster_id = s.cluster_id AND r.content_hash = s.content_hash
         WHERE m.run_id = ?1
         ORDER BY c.size DESC, m.cluster_id ASC",
    )?;

    let rows = stmt.query_map(params![run_id], |row| {
        let state: String = row.get(2)?;
        let status: Option<String> = row.get(9)?;
        Ok(MarketStateRow {
            cluster_id: row.get(0)?,
            size: row.get(1)?,
            state: MarketState::parse(&state).unwrap_or(MarketState::Niche),
            trailing_avg: row.get(3)?,
            percentile: row.get(4)?,
            direction: row.get(5)?,
            aio_present: row.get(6)?,
            search_unmatched: row.get(7)?,
            evaluated_at: row.get(8)?,
            enrichment_status: status.as_deref().and_then(EnrichmentStatus::parse),
            topic_title: row.get(10)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// --- Enrichment cache ---

const RECORD_COLUMNS: &str = "cluster_id, content_hash, category, topic_title, primary_question, related_questions,
     blog_angle, social_angle, why_now, evidence_summary, model_name, model_version, created_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(EnrichmentRecord, String, String)> {
    let related: String = row.get(5)?;
    let why_now: String = row.get(8)?;
    Ok((
        EnrichmentRecord {
            cluster_id: row.get(0)?,
            content_hash: row.get(1)?,
            category: row.get(2)?,
            topic_title: row.get(3)?,
            primary_question: row.get(4)?,
            related_questions: Vec::new(),
            blog_angle: row.get(6)?,
            social_angle: row.get(7)?,
            why_now: serde_json::Value::Null,
            evidence_summary: row.get(9)?,
            model_name: row.get(10)?,
            model_version: row.get(11)?,
            created_at: row.get(12)?,
        },
        related,
        why_now,
    ))
}

pub fn get_enrichment(conn: &Connection, cluster_id: &str, content_hash: &str) -> Result<Option<EnrichmentRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM enrichment_records WHERE cluster_id = ?1 AND content_hash = ?2");
    let found = conn
        .query_row(&sql, params![cluster_id, content_hash], row_to_record)
        .optional()?;

    match found {
        None => Ok(None),
        Some((mut record, related, why_now)) => {
            record.related_questions =
                serde_json::from_str(&related).context("Corrupt related_questions JSON in enrichment cache")?;
            record.why_now = serde_json::from_str(&why_now).context("Corrupt why_now JSON in enrichment cache")?;
            Ok(Some(record))
        }
    }
}

/// Atomically check the cache and claim the key.
///
/// Runs under an IMMEDIATE transaction so two workers (or two processes
/// sharing the file) cannot both see "no record, no claim". A claim older
/// than `lease` is treated as abandoned and taken over.
pub fn claim_enrichment(
    conn: &Connection,
    cluster_id: &str,
    content_hash: &str,
    run_id: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<ClaimOutcome> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    if let Some(record) = get_enrichment(&tx, cluster_id, content_hash)? {
        tx.commit()?;
        return Ok(ClaimOutcome::Hit(record));
    }

    let existing: Option<(String, String)> = tx
        .query_row(
            "SELECT run_id, claimed_at FROM enrichment_claims WHERE cluster_id = ?1 AND content_hash = ?2",
            params![cluster_id, content_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((owner, claimed_at)) = existing {
        let live = DateTime::parse_from_rfc3339(&claimed_at)
            .map(|t| now.signed_duration_since(t.with_timezone(&Utc)) < lease)
            .unwrap_or(false);
        if live && owner != run_id {
            tx.commit()?;
            return Ok(ClaimOutcome::InFlight);
        }
    }

    tx.execute(
        "INSERT INTO enrichment_claims (cluster_id, content_hash, run_id, claimed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(cluster_id, content_hash) DO UPDATE SET run_id = ?3, claimed_at = ?4",
        params![cluster_id, content_hash, run_id, now.to_rfc3339()],
    )?;
    tx.commit().context("Failed to claim enrichment key")?;
    Ok(ClaimOutcome::Claimed)
}

/// Upsert a record and drop the claim in one transaction. Reports whether
/// an existing record was overwritten.
pub fn store_enrichment(conn: &Connection, record: &EnrichmentRecord) -> Result<StoreOutcome> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let existed: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM enrichment_records WHERE cluster_id = ?1 AND content_hash = ?2",
        params![record.cluster_id, record.content_hash],
        |row| row.get(0),
    )?;

    tx.execute(
        "INSERT INTO enrichment_records
            (cluster_id, content_hash, category, topic_title, primary_question, related_questions,
             blog_angle, social_angle, why_now, evidence_summary, model_name, model_version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(cluster_id, content_hash) DO UPDATE SET
            category = ?3, topic_title = ?4, primary_question = ?5, related_questions = ?6,
            blog_angle = ?7, social_angle = ?8, why_now = ?9, evidence_summary = ?10,
            model_name = ?11, model_version = ?12, created_at = ?13",
        params![
            record.cluster_id,
            record.content_hash,
            record.category,
            record.topic_title,
            record.primary_question,
            serde_json::to_string(&record.related_questions)?,
            record.blog_angle,
            record.social_angle,
            serde_json::to_string(&record.why_now)?,
            record.evidence_summary,
            record.model_name,
            record.model_version,
            record.created_at,
        ],
    )?;

    tx.execute(
        "DELETE FROM enrichment_claims WHERE cluster_id = ?1 AND content_hash = ?2",
        params![record.cluster_id, record.content_hash],
    )?;
    tx.commit().context("Failed to store enrichment record")?;

    Ok(if existed {
        StoreOutcome::Replaced
    } else {
        StoreOutcome::Inserted
    })
}

/// Drop this run's claim on a key after a failed enrichment.
pub fn release_claim(conn: &Connection, cluster_id: &str, content_hash: &str, run_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM enrichment_claims WHERE cluster_id = ?1 AND content_hash = ?2 AND run_id = ?3",
        params![cluster_id, content_hash, run_id],
    )?;
    Ok(())
}

pub fn enrichment_record_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM enrichment_records", [], |row| row.get(0))?)
}

// --- Enrichment status ---

pub fn set_enrichment_status(conn: &Connection, status: &ClusterStatus) -> Result<()> {
    conn.execute(
        "INSERT INTO enrichment_status (run_id, cluster_id, content_hash, status, attempts, error, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(run_id, cluster_id) DO UPDATE SET
            content_hash = ?3, status = ?4, attempts = ?5, error = ?6, updated_at = datetime('now')",
        params![
            status.run_id,
            status.cluster_id,
            status.content_hash,
            status.status.as_str(),
            status.attempts,
            status.error,
        ],
    )?;
    Ok(())
}

pub fn get_enrichment_statuses(conn: &Connection, run_id: &str) -> Result<Vec<ClusterStatus>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, cluster_id, content_hash, status, attempts, error
         FROM enrichment_status WHERE run_id = ?1 ORDER BY cluster_id",
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        let status: String = row.get(3)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            status,
            row.get::<_, u32>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (run_id, cluster_id, content_hash, status, attempts, error) = row?;
        let status = EnrichmentStatus::parse(&status)
            .with_context(|| format!("Unknown enrichment status {status:?} for {cluster_id}"))?;
        out.push(ClusterStatus {
            run_id,
            cluster_id,
            content_hash,
            status,
            attempts,
            error,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn record(cluster_id: &str, hash: &str, title: &str) -> EnrichmentRecord {
        EnrichmentRecord {
            cluster_id: cluster_id.to_string(),
            content_hash: hash.to_string(),
            category: "SPRING_RECIPES".to_string(),
            topic_title: title.to_string(),
            primary_question: "q".to_string(),
            related_questions: vec!["a".into(), "b".into(), "c".into()],
            blog_angle: "b".to_string(),
            social_angle: "s".to_string(),
            why_now: serde_json::json!({"reason": "season"}),
            evidence_summary: "e".to_string(),
            model_name: "m".to_string(),
            model_version: "1".to_string(),
            created_at: "2025-05-01T00:00:00+00:00".to_string(),
        }
    }

    fn run(id: &str, started: &str) -> RunRecord {
        RunRecord {
            run_id: id.to_string(),
            started_at: started.to_string(),
            finished_at: None,
            status: "running".to_string(),
            params: "{}".to_string(),
            document_count: 10,
            cluster_count: 2,
            noise_ratio: 0.1,
        }
    }

    #[test]
    fn test_run_lifecycle() {
        let conn = test_conn();
        insert_run(&conn, &run("r1", "2025-05-01T00:00:00Z")).unwrap();
        insert_run(&conn, &run("r2", "2025-05-02T00:00:00Z")).unwrap();
        finish_run(&conn, "r1", "completed", "2025-05-01T00:10:00Z").unwrap();

        assert_eq!(run_count(&conn).unwrap(), 2);
        assert_eq!(latest_run(&conn).unwrap().unwrap().run_id, "r2");
        let r1 = get_run(&conn, "r1").unwrap().unwrap();
        assert_eq!(r1.status, "completed");
        assert!(r1.finished_at.is_some());
        assert!(get_run(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_clear_run_outputs_only_touches_that_run() {
        let conn = test_conn();
        for run_id in ["r1", "r2"] {
            set_enrichment_status(
                &conn,
                &ClusterStatus {
                    run_id: run_id.to_string(),
                    cluster_id: "cl-a".to_string(),
                    content_hash: Some("h1".to_string()),
                    status: EnrichmentStatus::NotSelected,
                    attempts: 0,
                    error: None,
                },
            )
            .unwrap();
        }
        store_enrichment(&conn, &record("cl-a", "h1", "Title")).unwrap();

        assert_eq!(clear_run_outputs(&conn, "r1").unwrap(), 1);
        assert!(get_enrichment_statuses(&conn, "r1").unwrap().is_empty());
        assert_eq!(get_enrichment_statuses(&conn, "r2").unwrap().len(), 1);
        assert_eq!(enrichment_record_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_claim_then_store_then_hit() {
        let conn = test_conn();
        let now = Utc::now();
        let lease = Duration::minutes(10);

        let first = claim_enrichment(&conn, "cl-a", "h1", "r1", now, lease).unwrap();
        assert_eq!(first, ClaimOutcome::Claimed);

        let rival = claim_enrichment(&conn, "cl-a", "h1", "r2", now, lease).unwrap();
        assert_eq!(rival, ClaimOutcome::InFlight);

        let outcome = store_enrichment(&conn, &record("cl-a", "h1", "Title")).unwrap();
        assert_eq!(outcome, StoreOutcome::Inserted);

        match claim_enrichment(&conn, "cl-a", "h1", "r2", now, lease).unwrap() {
            ClaimOutcome::Hit(rec) => {
                assert_eq!(rec.topic_title, "Title");
                assert_eq!(rec.related_questions.len(), 3);
                assert_eq!(rec.why_now["reason"], "season");
            }
            other => panic!("expected cache hit, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_claim_is_reclaimed() {
        let conn = test_conn();
        let then = Utc::now() - Duration::hours(2);
        claim_enrichment(&conn, "cl-a", "h1", "r1", then, Duration::minutes(10)).unwrap();
        let outcome = claim_enrichment(&conn, "cl-a", "h1", "r2", Utc::now(), Duration::minutes(10)).unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
    }

    #[test]
    fn test_release_claim_frees_key() {
        let conn = test_conn();
        let now = Utc::now();
        claim_enrichment(&conn, "cl-a", "h1", "r1", now, Duration::minutes(10)).unwrap();
        release_claim(&conn, "cl-a", "h1", "r1").unwrap();
        let outcome = claim_enrichment(&conn, "cl-a", "h1", "r2", now, Duration::minutes(10)).unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
    }

    #[test]
    fn test_second_store_reports_replaced_and_last_writer_wins() {
        let conn = test_conn();
        store_enrichment(&conn, &record("cl-a", "h1", "First")).unwrap();
        let outcome = store_enrichment(&conn, &record("cl-a", "h1", "Second")).unwrap();
        assert_eq!(outcome, StoreOutcome::Replaced);
        let rec = get_enrichment(&conn, "cl-a", "h1").unwrap().unwrap();
        assert_eq!(rec.topic_title, "Second");
        assert_eq!(enrichment_record_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_status_upsert() {
        let conn = test_conn();
        let mut status = ClusterStatus {
            run_id: "r1".to_string(),
            cluster_id: "cl-a".to_string(),
            content_hash: Some("h1".to_string()),
            status: EnrichmentStatus::InFlight,
            attempts: 0,
            error: None,
        };
        set_enrichment_status(&conn, &status).unwrap();
        status.status = EnrichmentStatus::Failed;
        status.attempts = 4;
        status.error = Some("missing related_questions".to_string());
        set_enrichment_status(&conn, &status).unwrap();

        let rows = get_enrichment_statuses(&conn, "r1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, EnrichmentStatus::Failed);
        assert_eq!(rows[0].attempts, 4);
    }
}

// Database schema — table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per pipeline run
        CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,              -- running / completed / cancelled / failed
            params TEXT NOT NULL,              -- clustering parameters, JSON
            document_count INTEGER NOT NULL DEFAULT 0,
            cluster_count INTEGER NOT NULL DEFAULT 0,
            noise_ratio REAL NOT NULL DEFAULT 0
        );

        -- Clusters produced by a run (noise included)
        CREATE TABLE IF NOT EXISTS clusters (
            run_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            is_noise INTEGER NOT NULL,
            size INTEGER NOT NULL,
            params TEXT NOT NULL,              -- JSON
            centroid TEXT NOT NULL,            -- JSON array
            PRIMARY KEY (run_id, cluster_id)
        );

        -- Document membership; every document of a run appears exactly once
        CREATE TABLE IF NOT EXISTS cluster_assignments (
            run_id TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            distance_to_centroid REAL NOT NULL,
            is_representative INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (run_id, doc_id)
        );

        CREATE TABLE IF NOT EXISTS fingerprints (
            run_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            keywords TEXT NOT NULL,            -- JSON array, rank order
            PRIMARY KEY (run_id, cluster_id)
        );

        -- Fused monthly trend per cluster
        CREATE TABLE IF NOT EXISTS trend_rows (
            run_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            month TEXT NOT NULL,               -- YYYY-MM
            post_count INTEGER NOT NULL,
            engagement_volume REAL NOT NULL,
            search_impressions REAL NOT NULL,
            engagement_norm REAL NOT NULL,
            search_norm REAL NOT NULL,
            fused_score REAL NOT NULL,
            mom_change REAL,
            moving_avg_3m REAL NOT NULL,
            PRIMARY KEY (run_id, cluster_id, month)
        );

        CREATE TABLE IF NOT EXISTS market_states (
            run_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            state TEXT NOT NULL,               -- Emerging / Competitive / Saturated / Niche
            trailing_avg REAL NOT NULL,
            percentile REAL NOT NULL,
            direction TEXT NOT NULL,
            aio_present INTEGER NOT NULL,
            search_unmatched INTEGER NOT NULL,
            evaluated_at TEXT NOT NULL,
            PRIMARY KEY (run_id, cluster_id)
        );

        -- Enrichment cache, shared across runs
        CREATE TABLE IF NOT EXISTS enrichment_records (
            cluster_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            category TEXT NOT NULL,
            topic_title TEXT NOT NULL,
            primary_question TEXT NOT NULL,
            related_questions TEXT NOT NULL,   -- JSON array
            blog_angle TEXT NOT NULL,
            social_angle TEXT NOT NULL,
            why_now TEXT NOT NULL,             -- JSON string or object
            evidence_summary TEXT NOT NULL,
            model_name TEXT NOT NULL,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (cluster_id, content_hash)
        );

        -- In-flight enrichment claims, so retried batches don't double-call
        CREATE TABLE IF NOT EXISTS enrichment_claims (
            cluster_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            run_id TEXT NOT NULL,
            claimed_at TEXT NOT NULL,
            PRIMARY KEY (cluster_id, content_hash)
        );

        -- Per-run enrichment outcome for every non-noise cluster
        CREATE TABLE IF NOT EXISTS enrichment_status (
            run_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            content_hash TEXT,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (run_id, cluster_id)
        );

        -- Index for finding the latest run
        CREATE INDEX IF NOT EXISTS idx_runs_started
            ON runs(started_at);

        -- Index for listing a cluster's members
        CREATE INDEX IF NOT EXISTS idx_assignments_cluster
            ON cluster_assignments(run_id, cluster_id);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (?1)", [1])?;

    // Migration v2: record which clustering algorithm produced each cluster.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE clusters ADD COLUMN algorithm TEXT NOT NULL DEFAULT 'hdbscan';")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

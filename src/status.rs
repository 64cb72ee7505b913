// System status display — shows DB stats, run history and cache size.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_path: &str) -> Result<()> {
    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    let runs = db.run_count().await?;
    println!("Runs recorded: {runs}");

    match db.latest_run().await? {
        Some(run) => {
            println!(
                "Latest run: {} ({}, started {})",
                run.run_id, run.status, run.started_at
            );
            println!(
                "  {} documents, {} clusters, {:.0}% noise",
                run.document_count,
                run.cluster_count,
                run.noise_ratio * 100.0
            );
            let statuses = db.get_enrichment_statuses(&run.run_id).await?;
            let with_record = statuses.iter().filter(|s| s.status.has_record()).count();
            let failed = statuses
                .iter()
                .filter(|s| s.status == crate::db::models::EnrichmentStatus::Failed)
                .count();
            println!(
                "  enrichment: {} with briefs, {} failed, {} other",
                with_record,
                failed,
                statuses.len() - with_record - failed
            );
        }
        None => {
            println!("Latest run: none yet");
            println!("  Run `topicscout run --documents <file>` to start one");
        }
    }

    let cached = db.enrichment_record_count().await?;
    println!("Cached enrichment records: {cached}");

    Ok(())
}

/// Whether the database file exists yet.
pub fn database_exists(db_path: &str) -> bool {
    Path::new(db_path).exists()
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_show_on_empty_database() {
        let db = crate::db::in_memory().unwrap();
        show(&db, ":memory:").await.unwrap();
    }
}

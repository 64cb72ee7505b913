// Colored terminal output for run summaries and market-state reports.
//
// This module handles all terminal-specific formatting: colors and tables.
// The main.rs commands delegate here.

use colored::Colorize;

use super::truncate_chars;
use crate::db::models::{EnrichmentStatus, MarketState, MarketStateRow, RunRecord};
use crate::pipeline::{Analysis, EnrichSummary};
use crate::scoring::market::MarketAssessment;

pub fn colorize_state(state: MarketState) -> String {
    let label = format!("{:<11}", state.as_str());
    match state {
        MarketState::Emerging => label.green().bold().to_string(),
        MarketState::Competitive => label.yellow().to_string(),
        MarketState::Saturated => label.red().to_string(),
        MarketState::Niche => label.dimmed().to_string(),
    }
}

fn colorize_status(status: Option<EnrichmentStatus>) -> String {
    match status {
        Some(s @ (EnrichmentStatus::Enriched | EnrichmentStatus::Cached)) => s.as_str().green().to_string(),
        Some(s @ EnrichmentStatus::Failed) => s.as_str().red().to_string(),
        Some(s) => s.as_str().dimmed().to_string(),
        None => "-".dimmed().to_string(),
    }
}

fn state_counts<'a>(states: impl Iterator<Item = &'a MarketState>) -> [(MarketState, usize); 4] {
    let mut counts = [
        (MarketState::Emerging, 0),
        (MarketState::Competitive, 0),
        (MarketState::Saturated, 0),
        (MarketState::Niche, 0),
    ];
    for s in states {
        if let Some(slot) = counts.iter_mut().find(|(k, _)| k == s) {
            slot.1 += 1;
        }
    }
    counts
}

/// Summary printed after `run` (and by `run --dry-run`, which has no enrichment).
pub fn display_run_summary(run_id: &str, analysis: &Analysis, enrichment: Option<&EnrichSummary>) {
    let partition = &analysis.partition;
    println!("\n{}", format!("=== Run {run_id} ===").bold());
    println!(
        "  Documents: {}   Clusters: {}   Noise: {} ({:.0}%)",
        partition.total_documents(),
        partition.clusters.len(),
        partition.noise.size(),
        partition.noise_ratio() * 100.0
    );

    let counts = state_counts(analysis.assessments.iter().map(|a| &a.state));
    let line: Vec<String> = counts
        .iter()
        .map(|(state, n)| format!("{} {}", n, state.as_str()))
        .collect();
    println!("  Market states: {}", line.join(", "));

    if !analysis.assessments.is_empty() {
        println!();
        display_assessments(analysis);
    }

    if let Some(e) = enrichment {
        println!(
            "\n  Enrichment: {} enriched, {} cached, {} failed, {} in flight, {} cancelled ({} calls)",
            e.enriched.to_string().green(),
            e.cached,
            if e.failed > 0 {
                e.failed.to_string().red().to_string()
            } else {
                e.failed.to_string()
            },
            e.in_flight,
            e.cancelled,
            e.external_calls
        );
    }
}

/// Keyword bar charts for the `limit` largest clusters.
pub fn display_fingerprints(analysis: &Analysis, limit: usize) {
    let mut clusters: Vec<_> = analysis.partition.clusters.iter().collect();
    clusters.sort_by(|a, b| b.size().cmp(&a.size()).then_with(|| a.cluster_id.cmp(&b.cluster_id)));

    println!("\n{}", "Fingerprints".bold());
    for cluster in clusters.into_iter().take(limit) {
        if let Some(profile) = analysis.extraction.profile(&cluster.cluster_id) {
            profile.fingerprint.display();
        }
    }
}

fn display_assessments(analysis: &Analysis) {
    println!(
        "  {:<16} {:>5}  {:<11}  {:>6}  {:>5}  {:<7}  {:<3}  {}",
        "Cluster".dimmed(),
        "Size".dimmed(),
        "State".dimmed(),
        "Avg".dimmed(),
        "Pct".dimmed(),
        "Trend".dimmed(),
        "AIO".dimmed(),
        "Keywords".dimmed(),
    );
    println!("  {}", "-".repeat(90).dimmed());

    for a in &analysis.assessments {
        let size = analysis.partition.cluster(&a.cluster_id).map(|c| c.size()).unwrap_or(0);
        let keywords = analysis
            .extraction
            .profile(&a.cluster_id)
            .map(|p| p.fingerprint.top_terms(4).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        print_assessment(a, size, &keywords);
    }
}

fn print_assessment(a: &MarketAssessment, size: usize, keywords: &str) {
    let unmatched = if a.search_unmatched { "*" } else { "" };
    println!(
        "  {:<16} {:>5}  {}  {:>6.3}  {:>5.0}  {:<7}  {:<3}  {}{}",
        truncate_chars(&a.cluster_id, 16),
        size,
        colorize_state(a.state),
        a.trailing_avg,
        a.percentile,
        a.direction.as_str(),
        if a.aio_present { "yes" } else { "no" },
        keywords,
        unmatched.dimmed(),
    );
}

/// Display the stored market-state table of a run.
pub fn display_market_report(run: &RunRecord, rows: &[MarketStateRow]) {
    println!(
        "\n{}",
        format!("=== Market Report: {} ({} clusters) ===", run.run_id, rows.len()).bold()
    );
    println!(
        "  {}",
        format!(
            "started {}  status {}  documents {}  noise {:.0}%",
            run.started_at,
            run.status,
            run.document_count,
            run.noise_ratio * 100.0
        )
        .dimmed()
    );
    println!();

    if rows.is_empty() {
        println!("  No clusters stored for this run.");
        return;
    }

    println!(
        "  {:<16} {:>5}  {:<11}  {:>6}  {:>5}  {:<7}  {:<18}  {}",
        "Cluster".dimmed(),
        "Size".dimmed(),
        "State".dimmed(),
        "Avg".dimmed(),
        "Pct".dimmed(),
        "Trend".dimmed(),
        "Enrichment".dimmed(),
        "Title".dimmed(),
    );
    println!("  {}", "-".repeat(100).dimmed());

    for row in rows {
        println!(
            "  {:<16} {:>5}  {}  {:>6.3}  {:>5.0}  {:<7}  {:<18}  {}",
            truncate_chars(&row.cluster_id, 16),
            row.size,
            colorize_state(row.state),
            row.trailing_avg,
            row.percentile,
            row.direction,
            colorize_status(row.enrichment_status),
            row.topic_title.as_deref().map(|t| truncate_chars(t, 60)).unwrap_or_default(),
        );
    }

    println!();
    let counts = state_counts(rows.iter().map(|r| &r.state));
    for (state, n) in counts {
        if n > 0 {
            println!("  {} {}", colorize_state(state), n);
        }
    }
    let unmatched = rows.iter().filter(|r| r.search_unmatched).count();
    if unmatched > 0 {
        println!(
            "  {}",
            format!("{unmatched} cluster(s) had no matching search-console queries").dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_counts() {
        let states = [MarketState::Niche, MarketState::Emerging, MarketState::Niche];
        let counts = state_counts(states.iter());
        assert_eq!(counts[0], (MarketState::Emerging, 1));
        assert_eq!(counts[3], (MarketState::Niche, 2));
    }

    #[test]
    fn test_colorize_state_keeps_label() {
        colored::control::set_override(false);
        assert_eq!(colorize_state(MarketState::Saturated).trim(), "Saturated");
    }
}

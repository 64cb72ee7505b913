// Fingerprint — the ranked keyword summary of what a cluster talks about.
//
// Keywords are ordered by term-importance score (highest first). The order
// matters: search-console matching only looks at the top few, and the
// enrichment cache key hashes the full ordered list.

use colored::Colorize;
use serde::{Deserialize, Serialize};

/// A single ranked term with the score that placed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredKeyword {
    pub term: String,
    pub score: f64,
}

/// Keyword fingerprint for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fingerprint {
    pub cluster_id: String,
    /// Descending score; ties broken alphabetically.
    pub keywords: Vec<ScoredKeyword>,
}

impl Fingerprint {
    /// Keyword terms in rank order.
    pub fn terms(&self) -> Vec<String> {
        self.keywords.iter().map(|k| k.term.clone()).collect()
    }

    /// The first `n` terms, used for search-console matching.
    pub fn top_terms(&self, n: usize) -> impl Iterator<Item = &str> {
        self.keywords.iter().take(n).map(|k| k.term.as_str())
    }

    pub fn top_keyword(&self) -> Option<&str> {
        self.keywords.first().map(|k| k.term.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Print the fingerprint as a short bar chart, scaled to the top score.
    pub fn display(&self) {
        println!("  {}", self.cluster_id.bold());
        let Some(max) = self.keywords.first().map(|k| k.score) else {
            println!("      {}", "(no keywords)".dimmed());
            return;
        };

        let bar_width: usize = 20;
        for kw in &self.keywords {
            let ratio = if max > 0.0 { kw.score / max } else { 0.0 };
            let filled = (ratio * bar_width as f64).round() as usize;
            let bar = format!("[{}{}]", "=".repeat(filled), " ".repeat(bar_width - filled.min(bar_width)));
            let colored_bar = if ratio >= 0.66 {
                bar.bright_green()
            } else if ratio >= 0.33 {
                bar.bright_yellow()
            } else {
                bar.bright_blue()
            };
            println!("      {:<24} {} {:.4}", kw.term, colored_bar, kw.score);
        }
    }
}

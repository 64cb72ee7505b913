// Prompt text for the chat-completions enricher.

use std::fmt::Write;

use super::traits::EnrichmentRequest;
use crate::output::truncate_chars;

/// How much of the representative text goes into the prompt.
const MAX_REPRESENTATIVE_CHARS: usize = 600;
const MAX_SUPPORTING_CHARS: usize = 300;
const MAX_QUERIES: usize = 5;

pub const SYSTEM_PROMPT: &str =
    "You are a content strategist analyzing kitchen lifestyle discussion topics. Always respond with valid JSON only.";

/// Build the user message for one cluster.
pub fn build_prompt(request: &EnrichmentRequest, categories: &[String]) -> String {
    let mut p = String::new();
    // Writing into a String is infallible.
    let _ = writeln!(p, "Analyze this cluster of community posts.\n");
    let _ = writeln!(
        p,
        "Representative post:\n{}\n",
        truncate_chars(request.representative_text.trim(), MAX_REPRESENTATIVE_CHARS)
    );
    if !request.supporting_texts.is_empty() {
        let _ = writeln!(p, "Other typical posts:");
        for text in &request.supporting_texts {
            let _ = writeln!(p, "- {}", truncate_chars(text.trim(), MAX_SUPPORTING_CHARS));
        }
        p.push('\n');
    }
    let _ = writeln!(p, "Key keywords: {}\n", request.fingerprint.join(", "));

    if !request.monthly_trend_summary.is_empty() {
        let _ = writeln!(p, "Monthly trend (most recent months):");
        for m in &request.monthly_trend_summary {
            let _ = writeln!(
                p,
                "- {}: {} posts, {:.0} total engagement, fused score {:.2}",
                m.month, m.post_count, m.engagement_volume, m.fused_score
            );
        }
        p.push('\n');
    }

    if request.matched_search_summary.is_empty() {
        let _ = writeln!(p, "Search console: no matching queries.\n");
    } else {
        let _ = writeln!(p, "Search console (top queries):");
        for q in request.matched_search_summary.iter().take(MAX_QUERIES) {
            let _ = writeln!(
                p,
                "- '{}': {:.0} impressions, {:.0} clicks, {:.2}% CTR",
                q.query,
                q.impressions,
                q.clicks,
                q.ctr() * 100.0
            );
        }
        p.push('\n');
    }

    if let Some(aio) = &request.aio_summary {
        let _ = writeln!(
            p,
            "AI overview present in search results{}: {}\n",
            aio.query
                .as_deref()
                .map(|q| format!(" for '{q}'"))
                .unwrap_or_default(),
            if aio.present { "yes" } else { "no" }
        );
    }

    let _ = write!(
        p,
        r#"Provide a JSON response with this structure:
{{
  "category": "One of: {}",
  "topic_title": "Topic title (max 500 chars)",
  "primary_question": "The main question readers ask",
  "related_questions": ["3 to 5 related questions"],
  "blog_angle": "Blog content angle",
  "social_angle": "Social media content angle",
  "why_now": {{"reason": "...", "trend": "..."}},
  "evidence_summary": "Summary of the evidence above"
}}
"#,
        categories.join(", ")
    );

    p
}

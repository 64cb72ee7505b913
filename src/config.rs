use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::clustering::{ClusterParams, Metric};
use crate::enrichment::openai::DEFAULT_API_URL;
use crate::enrichment::{EnrichmentSchema, RateLimiter, RetryPolicy};
use crate::pipeline::{EnrichOptions, RunSettings};
use crate::scoring::market::ClassifierThresholds;
use crate::signals::FusionConfig;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy. Every numeric key is
/// optional and falls back to the defaults of the structure it fills.
pub struct Config {
    pub db_path: String,
    /// Tunables for a run, before CLI overrides.
    pub settings: RunSettings,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub model_version: String,
}

/// Parse an optional env var, keeping `default` when it is unset or empty.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

/// Parse a requests-per-second key and check it maps to a usable interval.
fn env_rate(key: &str, default: f64) -> Result<f64> {
    let rate = env_or(key, default)?;
    RateLimiter::min_interval(rate).with_context(|| format!("Invalid value for {key}: {rate}"))?;
    Ok(rate)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only the API key is needed for enrichment; `init`, `report`,
    /// `status` and dry runs work without it.
    pub fn load() -> Result<Self> {
        let cluster_defaults = ClusterParams::default();
        let cluster = ClusterParams {
            min_cluster_size: env_or("TOPICSCOUT_MIN_CLUSTER_SIZE", cluster_defaults.min_cluster_size)?,
            min_samples: env_or("TOPICSCOUT_MIN_SAMPLES", cluster_defaults.min_samples)?,
            metric: env_or::<Metric>("TOPICSCOUT_METRIC", cluster_defaults.metric)?,
            cluster_selection_epsilon: env_or("TOPICSCOUT_CLUSTER_EPSILON", cluster_defaults.cluster_selection_epsilon)?,
        };

        let fusion_defaults = FusionConfig::default();
        let fusion = FusionConfig {
            engagement_weight: env_or("TOPICSCOUT_ENGAGEMENT_WEIGHT", fusion_defaults.engagement_weight)?,
            search_weight: env_or("TOPICSCOUT_SEARCH_WEIGHT", fusion_defaults.search_weight)?,
            match_keywords: env_or("TOPICSCOUT_MATCH_KEYWORDS", fusion_defaults.match_keywords)?,
            ..fusion_defaults
        };

        let threshold_defaults = ClassifierThresholds::default();
        let thresholds = ClassifierThresholds {
            emerging_percentile: env_or("TOPICSCOUT_EMERGING_PCT", threshold_defaults.emerging_percentile)?,
            competitive_percentile: env_or("TOPICSCOUT_COMPETITIVE_PCT", threshold_defaults.competitive_percentile)?,
            niche_percentile: env_or("TOPICSCOUT_NICHE_PCT", threshold_defaults.niche_percentile)?,
            flat_band: env_or("TOPICSCOUT_FLAT_BAND", threshold_defaults.flat_band)?,
            ..threshold_defaults
        };

        let enrich_defaults = EnrichOptions::default();
        let retry_defaults = RetryPolicy::default();
        let categories: Vec<String> = match env::var("ENRICH_CATEGORIES") {
            Ok(list) if !list.trim().is_empty() => list
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            _ => EnrichmentSchema::default().categories,
        };
        let enrich = EnrichOptions {
            budget: env_or("TOPICSCOUT_ENRICH_BUDGET", enrich_defaults.budget)?,
            concurrency: env_or("TOPICSCOUT_ENRICH_CONCURRENCY", enrich_defaults.concurrency)?,
            retry: RetryPolicy {
                max_retries: env_or("TOPICSCOUT_ENRICH_MAX_RETRIES", retry_defaults.max_retries)?,
                timeout: Duration::from_secs(env_or(
                    "TOPICSCOUT_ENRICH_TIMEOUT_SECS",
                    retry_defaults.timeout.as_secs(),
                )?),
                ..retry_defaults
            },
            requests_per_second: env_rate("TOPICSCOUT_ENRICH_RPS", enrich_defaults.requests_per_second)?,
            schema: EnrichmentSchema { categories },
            ..enrich_defaults
        };

        let settings = RunSettings {
            cluster,
            fingerprint_size: env_or("TOPICSCOUT_FINGERPRINT_SIZE", RunSettings::default().fingerprint_size)?,
            fusion,
            thresholds,
            enrich,
            skip_enrichment: false,
        };

        Ok(Self {
            db_path: env::var("TOPICSCOUT_DB_PATH").unwrap_or_else(|_| "./topicscout.db".to_string()),
            settings,
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            api_url: env::var("ENRICH_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            model: env::var("ENRICH_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            model_version: env::var("ENRICH_MODEL_VERSION").unwrap_or_else(|_| "1.0".to_string()),
        })
    }

    /// Check that the enrichment API key is configured.
    /// Call this before any run that will call the enricher.
    pub fn require_enricher(&self) -> Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!(
                "OPENAI_API_KEY not set. Add it to your .env file,\n\
                 or pass --skip-enrichment to cluster and classify without briefs."
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys are unique to each test so parallel tests don't race on env.

    #[test]
    fn test_env_or_default_when_unset() {
        let v: usize = env_or("TOPICSCOUT_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_env_or_parses_value() {
        env::set_var("TOPICSCOUT_TEST_PARSE_KEY", " 0.25 ");
        let v: f64 = env_or("TOPICSCOUT_TEST_PARSE_KEY", 1.0).unwrap();
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        env::set_var("TOPICSCOUT_TEST_BAD_KEY", "lots");
        let err = env_or::<usize>("TOPICSCOUT_TEST_BAD_KEY", 1).unwrap_err();
        assert!(format!("{err:#}").contains("TOPICSCOUT_TEST_BAD_KEY"));
    }

    #[test]
    fn test_env_rate_rejects_vanishing_rate() {
        env::set_var("TOPICSCOUT_TEST_TINY_RPS", "1e-300");
        let err = env_rate("TOPICSCOUT_TEST_TINY_RPS", 2.0).unwrap_err();
        assert!(format!("{err:#}").contains("TOPICSCOUT_TEST_TINY_RPS"));

        env::set_var("TOPICSCOUT_TEST_OK_RPS", "0.5");
        assert_eq!(env_rate("TOPICSCOUT_TEST_OK_RPS", 2.0).unwrap(), 0.5);
    }
}

// Retry wrapper for enrichment calls.
//
// One attempt = rate-limit slot + call under a timeout + schema validation.
// Timeouts, transport errors and schema failures all count as attempts and
// are retried with exponential backoff plus jitter, up to `max_retries`
// retries after the first call.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::rate_limiter::RateLimiter;
use super::schema::EnrichmentSchema;
use super::traits::{Enricher, EnrichmentRequest};
use crate::db::models::EnrichmentRecord;
use crate::error::EngineError;

/// Cap for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-call deadline.
    pub timeout: Duration,
    /// First backoff; doubles each retry. Zero disables sleeping.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(60),
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), with +/-25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.base_backoff.is_zero() {
            return Duration::ZERO;
        }
        let backoff = self
            .base_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
            .min(MAX_BACKOFF);

        let jitter_factor = rand::rng().random_range(0.75..1.25);
        Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor)
    }
}

/// Result of a retried call: the validated record or the last error, plus
/// how many calls were made.
#[derive(Debug)]
pub struct Attempted {
    pub result: Result<EnrichmentRecord, EngineError>,
    pub attempts: u32,
}

pub async fn enrich_with_retry(
    enricher: &dyn Enricher,
    request: &EnrichmentRequest,
    schema: &EnrichmentSchema,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
) -> Attempted {
    let mut attempts = 0u32;

    loop {
        limiter.acquire().await;
        attempts += 1;

        let outcome = match tokio::time::timeout(policy.timeout, enricher.enrich(request)).await {
            Err(_) => Err(EngineError::Timeout(policy.timeout)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(response)) => schema.validate(&request.cluster_id, &request.content_hash, &response),
        };

        match outcome {
            Ok(record) => {
                return Attempted {
                    result: Ok(record),
                    attempts,
                }
            }
            Err(err) => {
                if !err.is_retryable() || attempts > policy.max_retries {
                    return Attempted {
                        result: Err(err),
                        attempts,
                    };
                }

                let wait = policy.backoff(attempts);
                warn!(
                    cluster_id = %request.cluster_id,
                    content_hash = %request.content_hash,
                    attempt = attempts,
                    max_attempts = policy.max_retries + 1,
                    backoff_secs = wait.as_secs_f64(),
                    error = %err,
                    "Enrichment attempt failed, retrying"
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::traits::EnrichmentResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        calls: AtomicU32,
        /// Calls before this index fail.
        succeed_from: u32,
        hang: bool,
    }

    #[async_trait]
    impl Enricher for Scripted {
        async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichmentResponse, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let payload = if n >= self.succeed_from {
                json!({
                    "category": "SPRING_RECIPES",
                    "topic_title": "t",
                    "primary_question": "q",
                    "related_questions": ["a", "b", "c"],
                    "blog_angle": "b",
                    "social_angle": "s",
                    "why_now": "now",
                    "evidence_summary": "e"
                })
            } else {
                json!({"category": "SPRING_RECIPES"})
            };
            Ok(EnrichmentResponse {
                payload,
                model_name: "m".to_string(),
                model_version: "1".to_string(),
            })
        }
    }

    fn request() -> EnrichmentRequest {
        EnrichmentRequest {
            cluster_id: "cl-a".to_string(),
            content_hash: "h".to_string(),
            representative_text: String::new(),
            supporting_texts: vec![],
            fingerprint: vec![],
            monthly_trend_summary: vec![],
            matched_search_summary: vec![],
            aio_summary: None,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            timeout: Duration::from_millis(50),
            base_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_schema_failures() {
        let enricher = Scripted {
            calls: AtomicU32::new(0),
            succeed_from: 2,
            hang: false,
        };
        let out = enrich_with_retry(
            &enricher,
            &request(),
            &EnrichmentSchema::default(),
            &fast_policy(),
            &RateLimiter::unlimited(),
        )
        .await;
        assert!(out.result.is_ok());
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_retries() {
        let enricher = Scripted {
            calls: AtomicU32::new(0),
            succeed_from: u32::MAX,
            hang: false,
        };
        let out = enrich_with_retry(
            &enricher,
            &request(),
            &EnrichmentSchema::default(),
            &fast_policy(),
            &RateLimiter::unlimited(),
        )
        .await;
        assert!(matches!(out.result, Err(EngineError::SchemaValidation(_))));
        assert_eq!(out.attempts, 4);
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let enricher = Scripted {
            calls: AtomicU32::new(0),
            succeed_from: 0,
            hang: true,
        };
        let policy = RetryPolicy {
            max_retries: 1,
            ..fast_policy()
        };
        let out = enrich_with_retry(
            &enricher,
            &request(),
            &EnrichmentSchema::default(),
            &policy,
            &RateLimiter::unlimited(),
        )
        .await;
        assert!(matches!(out.result, Err(EngineError::Timeout(_))));
        assert_eq!(out.attempts, 2);
    }

    struct Rejecting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Enricher for Rejecting {
        async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichmentResponse, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Rejected {
                status: 401,
                message: "invalid api key".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_rejected_call_is_not_retried() {
        let enricher = Rejecting {
            calls: AtomicU32::new(0),
        };
        let out = enrich_with_retry(
            &enricher,
            &request(),
            &EnrichmentSchema::default(),
            &fast_policy(),
            &RateLimiter::unlimited(),
        )
        .await;
        assert!(matches!(out.result, Err(EngineError::Rejected { status: 401, .. })));
        assert_eq!(out.attempts, 1);
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_secs(2),
            ..Default::default()
        };
        let first = policy.backoff(1).as_secs_f64();
        let third = policy.backoff(3).as_secs_f64();
        assert!((1.5..=2.5).contains(&first));
        assert!((6.0..=10.0).contains(&third));
        assert!(policy.backoff(30) <= Duration::from_secs_f64(75.0));
        assert_eq!(RetryPolicy { base_backoff: Duration::ZERO, ..Default::default() }.backoff(2), Duration::ZERO);
    }

    #[test]
    fn test_backoff_jitter_varies_within_band() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_secs(4),
            ..Default::default()
        };
        let samples: Vec<Duration> = (0..64).map(|_| policy.backoff(1)).collect();
        assert!(samples
            .iter()
            .all(|d| (3.0..5.0).contains(&d.as_secs_f64())));
        assert!(samples.iter().any(|d| *d != samples[0]));
    }
}

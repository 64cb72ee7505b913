// Enrichment — the external brief-writing collaborator, its schema check,
// the content-hash cache key and call pacing.

pub mod hash;
pub mod openai;
pub mod prompt;
pub mod rate_limiter;
pub mod retry;
pub mod schema;
pub mod traits;

pub use hash::content_hash;
pub use openai::OpenAiEnricher;
pub use rate_limiter::RateLimiter;
pub use retry::{enrich_with_retry, Attempted, RetryPolicy};
pub use schema::{EnrichmentSchema, DEFAULT_CATEGORIES};
pub use traits::{AioSummary, Enricher, EnrichmentRequest, EnrichmentResponse, NoopEnricher, TrendSummary};

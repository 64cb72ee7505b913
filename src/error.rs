// Engine error taxonomy.
//
// Clustering-stage errors (InsufficientData, MalformedEmbedding) are fatal for
// the run. Enrichment-stage errors are per-cluster: they are retried, then
// recorded against the cluster, and the batch keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer documents than `min_cluster_size` were supplied to clustering.
    #[error("insufficient data: {documents} documents supplied, min_cluster_size is {min_cluster_size}")]
    InsufficientData {
        documents: usize,
        min_cluster_size: usize,
    },

    /// A document's embedding is unusable (wrong dimension, NaN, duplicate id, ...).
    #[error("malformed embedding for document {doc_id}: {reason}")]
    MalformedEmbedding { doc_id: String, reason: String },

    /// A clustering or pacing setting is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The enrichment collaborator returned a payload that does not match the schema.
    #[error("enrichment schema validation failed: {0}")]
    SchemaValidation(String),

    /// Transport failure talking to the enrichment collaborator.
    #[error("enrichment call failed: {0}")]
    ExternalCall(String),

    /// The enrichment collaborator refused the request (bad key, bad request).
    /// Retrying would fail the same way.
    #[error("enrichment call rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The enrichment call did not finish within its deadline.
    #[error("enrichment call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Two writers stored a record for the same cache key.
    #[error("cache consistency: record for {cluster_id}/{content_hash} was overwritten")]
    CacheConsistency {
        cluster_id: String,
        content_hash: String,
    },
}

impl EngineError {
    /// Whether a failed enrichment attempt should be tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::SchemaValidation(_) | EngineError::ExternalCall(_) | EngineError::Timeout(_)
        )
    }

    /// Whether this error ends the whole run rather than a single cluster.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. }
                | EngineError::MalformedEmbedding { .. }
                | EngineError::InvalidParameter(_)
        )
    }
}

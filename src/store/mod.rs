// Vector store adapter — read-only view over (doc_id, embedding, metadata)
// tuples for one run.
//
// Everything downstream consumes `Document`s through the `VectorStore` trait,
// so the JSON Lines loader used by the CLI and the in-memory store used by
// tests are interchangeable.

pub mod jsonl;
pub mod traits;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub use jsonl::JsonlStore;
pub use traits::{InMemoryStore, VectorStore};

/// One analyzed post. Immutable once ingested for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub doc_id: String,
    pub embedding: Vec<f64>,
    /// Non-negative engagement signal (e.g. derived from upvotes).
    #[serde(default)]
    pub engagement_weight: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
}

/// Check that a document set is usable for clustering: unique ids, one
/// embedding dimension across the run, finite components, non-negative
/// engagement. Returns the dimension.
pub fn validate_documents(docs: &[Document]) -> Result<usize, EngineError> {
    let Some(first) = docs.first() else {
        return Ok(0);
    };
    let dim = first.embedding.len();
    let mut seen: HashSet<&str> = HashSet::with_capacity(docs.len());

    for doc in docs {
        if !seen.insert(doc.doc_id.as_str()) {
            return Err(EngineError::MalformedEmbedding {
                doc_id: doc.doc_id.clone(),
                reason: "duplicate doc_id".to_string(),
            });
        }
        if doc.embedding.is_empty() {
            return Err(EngineError::MalformedEmbedding {
                doc_id: doc.doc_id.clone(),
                reason: "empty embedding".to_string(),
            });
        }
        if doc.embedding.len() != dim {
            return Err(EngineError::MalformedEmbedding {
                doc_id: doc.doc_id.clone(),
                reason: format!("dimension {} does not match run dimension {dim}", doc.embedding.len()),
            });
        }
        if doc.embedding.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::MalformedEmbedding {
                doc_id: doc.doc_id.clone(),
                reason: "embedding contains NaN or infinite components".to_string(),
            });
        }
        if !doc.engagement_weight.is_finite() || doc.engagement_weight < 0.0 {
            return Err(EngineError::MalformedEmbedding {
                doc_id: doc.doc_id.clone(),
                reason: format!("engagement_weight must be non-negative, got {}", doc.engagement_weight),
            });
        }
    }

    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Vec<f64>) -> Document {
        Document {
            doc_id: id.to_string(),
            embedding,
            engagement_weight: 1.0,
            timestamp: Utc::now(),
            text: String::new(),
        }
    }

    #[test]
    fn test_validate_returns_dimension() {
        let docs = vec![doc("a", vec![0.0, 1.0]), doc("b", vec![1.0, 0.0])];
        assert_eq!(validate_documents(&docs).unwrap(), 2);
    }

    #[test]
    fn test_validate_rejects_dimension_mismatch() {
        let docs = vec![doc("a", vec![0.0, 1.0]), doc("b", vec![1.0])];
        let err = validate_documents(&docs).unwrap_err();
        assert!(matches!(err, EngineError::MalformedEmbedding { ref doc_id, .. } if doc_id == "b"));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let docs = vec![doc("a", vec![f64::NAN, 1.0])];
        assert!(validate_documents(&docs).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let docs = vec![doc("a", vec![0.0]), doc("a", vec![1.0])];
        let err = validate_documents(&docs).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_negative_engagement() {
        let mut d = doc("a", vec![0.0]);
        d.engagement_weight = -1.0;
        assert!(validate_documents(&[d]).is_err());
    }
}

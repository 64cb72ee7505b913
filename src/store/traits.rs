// Vector store trait — the leaf dependency of the engine.
//
// A store hands out the full, validated document snapshot for a run. The
// engine never writes back through it.

use anyhow::Result;

use super::{validate_documents, Document};

/// Read-only source of documents for a run.
pub trait VectorStore: Send + Sync {
    /// Load every document of the run, validated and in a stable order.
    fn documents(&self) -> Result<Vec<Document>>;

    /// Embedding dimension of the run (0 when the store is empty).
    fn dimension(&self) -> Result<usize> {
        let docs = self.documents()?;
        Ok(validate_documents(&docs)?)
    }
}

/// Store backed by an already-loaded vector of documents.
pub struct InMemoryStore {
    docs: Vec<Document>,
}

impl InMemoryStore {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }
}

impl VectorStore for InMemoryStore {
    fn documents(&self) -> Result<Vec<Document>> {
        validate_documents(&self.docs)?;
        Ok(self.docs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_in_memory_store_validates() {
        let store = InMemoryStore::new(vec![
            Document {
                doc_id: "a".into(),
                embedding: vec![1.0, 2.0],
                engagement_weight: 0.0,
                timestamp: Utc::now(),
                text: "hello".into(),
            },
            Document {
                doc_id: "b".into(),
                embedding: vec![1.0],
                engagement_weight: 0.0,
                timestamp: Utc::now(),
                text: "world".into(),
            },
        ]);
        assert!(store.documents().is_err());
    }

    #[test]
    fn test_in_memory_store_dimension() {
        let store = InMemoryStore::new(vec![Document {
            doc_id: "a".into(),
            embedding: vec![1.0, 2.0, 3.0],
            engagement_weight: 2.0,
            timestamp: Utc::now(),
            text: String::new(),
        }]);
        assert_eq!(store.dimension().unwrap(), 3);
    }
}

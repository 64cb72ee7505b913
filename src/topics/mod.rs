// Topic extraction — representative selection and keyword fingerprinting
// for each cluster of a run.

pub mod fingerprint;
pub mod representative;
pub mod tfidf;
pub mod traits;

pub use fingerprint::{Fingerprint, ScoredKeyword};
pub use representative::{assignments, select_representative, Assignment};
pub use tfidf::TfIdfExtractor;
pub use traits::{ClusterText, KeywordExtractor};

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::info;

use crate::clustering::{Cluster, Partition};
use crate::store::Document;

/// Everything extracted for one non-noise cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub cluster_id: String,
    pub representative_doc_id: String,
    pub fingerprint: Fingerprint,
}

/// Output of the extraction stage for a whole partition.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// One per non-noise cluster, in partition order.
    pub profiles: Vec<ClusterProfile>,
    /// One per input document, noise included.
    pub assignments: Vec<Assignment>,
}

impl Extraction {
    pub fn profile(&self, cluster_id: &str) -> Option<&ClusterProfile> {
        self.profiles.iter().find(|p| p.cluster_id == cluster_id)
    }
}

/// Resolve member documents for a cluster, in member_doc_id order.
fn members<'a>(cluster: &Cluster, by_id: &HashMap<&str, &'a Document>) -> Vec<&'a Document> {
    cluster
        .member_doc_ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .collect()
}

/// Pick representatives and fingerprints for every cluster. Clusters are
/// independent, so assignment work fans out across the rayon pool.
pub fn extract(partition: &Partition, docs: &[Document], extractor: &dyn KeywordExtractor) -> Extraction {
    let by_id: HashMap<&str, &Document> = docs.iter().map(|d| (d.doc_id.as_str(), d)).collect();

    let per_cluster: Vec<(Vec<Assignment>, Option<String>, ClusterText)> = partition
        .clusters
        .par_iter()
        .map(|cluster| {
            let m = members(cluster, &by_id);
            let (rows, rep) = assignments(cluster, &m);
            let text = m
                .iter()
                .map(|d| d.text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            (
                rows,
                rep,
                ClusterText {
                    cluster_id: cluster.cluster_id.clone(),
                    text,
                },
            )
        })
        .collect();

    let texts: Vec<ClusterText> = per_cluster.iter().map(|(_, _, t)| t.clone()).collect();
    let fingerprints = extractor.fingerprints(&texts);

    let mut all_rows = Vec::with_capacity(docs.len());
    let mut profiles = Vec::with_capacity(partition.clusters.len());
    for ((rows, rep, text), fingerprint) in per_cluster.into_iter().zip(fingerprints) {
        all_rows.extend(rows);
        if let Some(representative_doc_id) = rep {
            profiles.push(ClusterProfile {
                cluster_id: text.cluster_id,
                representative_doc_id,
                fingerprint,
            });
        }
    }

    let noise_members = members(&partition.noise, &by_id);
    let (noise_rows, _) = assignments(&partition.noise, &noise_members);
    all_rows.extend(noise_rows);

    info!(
        clusters = profiles.len(),
        assignments = all_rows.len(),
        "Extracted representatives and fingerprints"
    );

    Extraction {
        profiles,
        assignments: all_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ClusterParams;
    use chrono::Utc;

    fn doc(id: &str, embedding: Vec<f64>, text: &str) -> Document {
        Document {
            doc_id: id.to_string(),
            embedding,
            engagement_weight: 1.0,
            timestamp: Utc::now(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_extract_covers_every_document() {
        let docs = vec![
            doc("a1", vec![1.0, 0.0], "asparagus risotto"),
            doc("a2", vec![0.9, 0.1], "asparagus tart"),
            doc("b1", vec![0.0, 1.0], "fridge bins"),
            doc("b2", vec![0.1, 0.9], "fridge labels"),
            doc("n1", vec![-1.0, -1.0], "random"),
        ];
        let labels = vec![Some(0), Some(0), Some(1), Some(1), None];
        let partition = Partition::from_labels(&docs, &labels, &ClusterParams::default());
        let out = extract(&partition, &docs, &TfIdfExtractor::default());

        assert_eq!(out.assignments.len(), docs.len());
        assert_eq!(out.profiles.len(), 2);
        assert_eq!(out.profile("cl-a1").unwrap().fingerprint.top_keyword(), Some("asparagus"));
        assert_eq!(out.profile("cl-b1").unwrap().fingerprint.top_keyword(), Some("fridge"));
        let noise_row = out.assignments.iter().find(|a| a.doc_id == "n1").unwrap();
        assert_eq!(noise_row.cluster_id, "noise");
        assert!(!noise_row.is_representative);
    }
}

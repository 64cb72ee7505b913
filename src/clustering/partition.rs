// Partition — the output of clustering: non-noise clusters plus exactly one
// (possibly empty) noise cluster, covering every input document once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::params::ClusterParams;
use crate::store::Document;

/// Id of the shared noise cluster. Never collides with a real cluster id,
/// which always carries the `cl-` prefix.
pub const NOISE_CLUSTER_ID: &str = "noise";

/// A group of documents judged semantically coherent for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    /// `cl-<smallest member doc_id>` for real clusters, `noise` for the sink.
    /// Anchoring on a member keeps the id stable across runs as long as the
    /// logical cluster keeps that member.
    pub cluster_id: String,
    /// Sorted ascending.
    pub member_doc_ids: Vec<String>,
    pub is_noise: bool,
    /// Mean member embedding (empty for an empty noise cluster).
    pub centroid: Vec<f64>,
    pub params: ClusterParams,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.member_doc_ids.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partition {
    /// Non-noise clusters, sorted by cluster_id.
    pub clusters: Vec<Cluster>,
    pub noise: Cluster,
}

impl Partition {
    /// Build a partition from per-document labels (`None` = noise). `labels`
    /// is parallel to `docs`.
    pub fn from_labels(docs: &[Document], labels: &[Option<usize>], params: &ClusterParams) -> Self {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut noise_members = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            match label {
                Some(l) => groups.entry(*l).or_default().push(i),
                None => noise_members.push(i),
            }
        }

        let mut clusters: Vec<Cluster> = groups
            .into_values()
            .filter(|members| !members.is_empty())
            .map(|members| {
                let mut ids: Vec<String> = members.iter().map(|&i| docs[i].doc_id.clone()).collect();
                ids.sort();
                Cluster {
                    cluster_id: format!("cl-{}", ids[0]),
                    centroid: centroid(members.iter().map(|&i| docs[i].embedding.as_slice())),
                    member_doc_ids: ids,
                    is_noise: false,
                    params: params.clone(),
                }
            })
            .collect();
        clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

        let mut noise_ids: Vec<String> = noise_members.iter().map(|&i| docs[i].doc_id.clone()).collect();
        noise_ids.sort();
        let noise = Cluster {
            cluster_id: NOISE_CLUSTER_ID.to_string(),
            centroid: centroid(noise_members.iter().map(|&i| docs[i].embedding.as_slice())),
            member_doc_ids: noise_ids,
            is_noise: true,
            params: params.clone(),
        };

        Self { clusters, noise }
    }

    pub fn total_documents(&self) -> usize {
        self.clusters.iter().map(Cluster::size).sum::<usize>() + self.noise.size()
    }

    /// Fraction of documents assigned to noise (0.0 for an empty partition).
    pub fn noise_ratio(&self) -> f64 {
        let total = self.total_documents();
        if total == 0 {
            0.0
        } else {
            self.noise.size() as f64 / total as f64
        }
    }

    /// All clusters including the noise sink, noise last.
    pub fn all_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().chain(std::iter::once(&self.noise))
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<&Cluster> {
        self.all_clusters().find(|c| c.cluster_id == cluster_id)
    }
}

/// Component-wise mean of a set of vectors. Empty input gives an empty vector.
pub fn centroid<'a>(vectors: impl Iterator<Item = &'a [f64]>) -> Vec<f64> {
    let mut sum: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
        count += 1;
    }
    if count > 0 {
        for s in &mut sum {
            *s /= count as f64;
        }
    }
    sum
}

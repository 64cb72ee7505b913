// Representative selection — the one member that best stands for a cluster.
//
// The representative is the member with the highest cosine similarity to the
// cluster centroid. Similarities within SIMILARITY_TOLERANCE of each other are
// treated as equal and fall through to engagement weight (higher wins), then
// doc_id (lower wins).

use serde::{Deserialize, Serialize};

use crate::clustering::{cosine_similarity, Cluster};
use crate::store::Document;

const SIMILARITY_TOLERANCE: f64 = 1e-12;

/// Per-document membership record for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub cluster_id: String,
    pub doc_id: String,
    /// Distance to the cluster centroid under the cluster's metric.
    pub distance_to_centroid: f64,
    pub is_representative: bool,
}

/// Index into `members` of the representative, or `None` for no members.
pub fn select_representative(members: &[&Document], centroid: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (i, doc) in members.iter().enumerate() {
        let sim = cosine_similarity(&doc.embedding, centroid).unwrap_or(f64::NEG_INFINITY);
        let Some((b, best_sim)) = best else {
            best = Some((i, sim));
            continue;
        };

        let replace = if sim == best_sim || (sim - best_sim).abs() <= SIMILARITY_TOLERANCE {
            let incumbent = members[b];
            doc.engagement_weight > incumbent.engagement_weight
                || (doc.engagement_weight == incumbent.engagement_weight && doc.doc_id < incumbent.doc_id)
        } else {
            sim > best_sim
        };
        if replace {
            best = Some((i, sim));
        }
    }

    best.map(|(i, _)| i)
}

/// Build assignment rows for every member of `cluster`. Noise members get
/// distances but never a representative.
pub fn assignments(cluster: &Cluster, members: &[&Document]) -> (Vec<Assignment>, Option<String>) {
    let rep = if cluster.is_noise {
        None
    } else {
        select_representative(members, &cluster.centroid)
    };
    let metric = cluster.params.metric;

    let rows = members
        .iter()
        .enumerate()
        .map(|(i, doc)| Assignment {
            cluster_id: cluster.cluster_id.clone(),
            doc_id: doc.doc_id.clone(),
            distance_to_centroid: metric.distance(&doc.embedding, &cluster.centroid),
            is_representative: rep == Some(i),
        })
        .collect();

    (rows, rep.map(|i| members[i].doc_id.clone()))
}

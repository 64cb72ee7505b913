pub mod hdbscan;
pub mod params;
pub mod partition;
pub mod traits;

pub use hdbscan::Hdbscan;
pub use params::{cosine_similarity, euclidean, ClusterParams, Metric};
pub use partition::{centroid, Cluster, Partition, NOISE_CLUSTER_ID};
pub use traits::Clusterer;

use crate::error::EngineError;
use crate::store::Document;

/// Cluster documents with the default density clusterer.
pub fn cluster(docs: &[Document], params: &ClusterParams) -> Result<Partition, EngineError> {
    Hdbscan.cluster(docs, params)
}

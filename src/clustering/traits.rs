// Clusterer trait — the swap-ready seam for density clustering.
//
// Callers only see `cluster(documents, params) -> Partition`, so a different
// density algorithm can replace HDBSCAN without touching the pipeline.

use super::params::ClusterParams;
use super::partition::Partition;
use crate::error::EngineError;
use crate::store::Document;

pub trait Clusterer: Send + Sync {
    /// Short algorithm name, stored with run metadata.
    fn name(&self) -> &'static str;

    /// Partition `docs` into clusters plus one noise cluster. Deterministic for
    /// a fixed input order, input data and configuration.
    fn cluster(&self, docs: &[Document], params: &ClusterParams) -> Result<Partition, EngineError>;
}

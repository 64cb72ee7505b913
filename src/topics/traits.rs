// Keyword extractor trait — swap-ready abstraction.
//
// Extraction sees every cluster of the run at once, because term rarity is
// measured across clusters rather than within one. The default implementation
// is TF-IDF with each cluster treated as a single document.

use super::fingerprint::Fingerprint;

/// Concatenated member text of one non-noise cluster.
#[derive(Debug, Clone)]
pub struct ClusterText {
    pub cluster_id: String,
    pub text: String,
}

pub trait KeywordExtractor: Send + Sync {
    /// Produce one fingerprint per input cluster, in input order.
    fn fingerprints(&self, clusters: &[ClusterText]) -> Vec<Fingerprint>;
}

// TF-IDF keyword extraction across the clusters of one run.
//
// Each cluster's concatenated text is one document. Term frequency is
// normalized by the cluster's token count, and inverse document frequency
// uses the smoothed form ln((1 + N) / (1 + df)) + 1, so a term present in
// every cluster still scores but always below an equally frequent term that
// only this cluster uses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use rayon::prelude::*;
use regex_lite::Regex;
use stop_words::{get, LANGUAGE};
use tracing::debug;

use super::fingerprint::{Fingerprint, ScoredKeyword};
use super::traits::{ClusterText, KeywordExtractor};

/// Shortest token kept as a keyword candidate.
const MIN_TOKEN_LEN: usize = 3;

pub struct TfIdfExtractor {
    /// K: how many keywords each fingerprint keeps.
    pub top_k: usize,
    stop_words: HashSet<String>,
}

impl TfIdfExtractor {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            stop_words: get(LANGUAGE::English).into_iter().collect(),
        }
    }

    /// Lowercased alphanumeric tokens, minus stop words, short tokens and
    /// bare numbers.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        static TOKEN: OnceLock<Regex> = OnceLock::new();
        let re = TOKEN.get_or_init(|| Regex::new(r"[a-z0-9]+(?:'[a-z]+)?").expect("static regex"));

        let lower = text.to_lowercase();
        re.find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|t| t.len() >= MIN_TOKEN_LEN)
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .filter(|t| !self.stop_words.contains(*t))
            .map(str::to_string)
            .collect()
    }
}

impl Default for TfIdfExtractor {
    fn default() -> Self {
        Self::new(10)
    }
}

impl KeywordExtractor for TfIdfExtractor {
    fn fingerprints(&self, clusters: &[ClusterText]) -> Vec<Fingerprint> {
        let counts: Vec<BTreeMap<String, usize>> = clusters
            .par_iter()
            .map(|c| {
                let mut tf = BTreeMap::new();
                for token in self.tokenize(&c.text) {
                    *tf.entry(token).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for tf in &counts {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        let n_docs = clusters.len() as f64;

        debug!(
            clusters = clusters.len(),
            vocabulary = df.len(),
            "Computed cluster document frequencies"
        );

        clusters
            .par_iter()
            .zip(counts.par_iter())
            .map(|(cluster, tf)| {
                let total: usize = tf.values().sum();
                let mut scored: Vec<ScoredKeyword> = tf
                    .iter()
                    .map(|(term, &count)| {
                        let doc_freq = df.get(term.as_str()).copied().unwrap_or(0) as f64;
                        let idf = ((1.0 + n_docs) / (1.0 + doc_freq)).ln() + 1.0;
                        ScoredKeyword {
                            term: term.clone(),
                            score: (count as f64 / total as f64) * idf,
                        }
                    })
                    .collect();
                scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.term.cmp(&b.term)));
                scored.truncate(self.top_k);

                Fingerprint {
                    cluster_id: cluster.cluster_id.clone(),
                    keywords: scored,
                }
            })
            .collect()
    }
}

// HDBSCAN — hierarchical density clustering with explicit noise.
//
// Steps:
// 1. Core distance of each point = distance to its `min_samples`-th nearest
//    other point.
// 2. Minimum spanning tree over the mutual-reachability graph
//    (max(core_a, core_b, d(a, b))), built with Prim's algorithm so memory
//    stays O(n) instead of a full distance matrix.
// 3. Single-linkage hierarchy from the sorted MST edges.
// 4. Condensed tree: splits where both sides have at least
//    `min_cluster_size` points create new clusters, smaller sides "fall out"
//    as points.
// 5. Excess-of-mass selection by stability, optional epsilon merge.
// 6. Points whose cluster chain reaches a selected cluster get its label;
//    everything else is noise.
//
// All tie-breaks go by index, so output only depends on input order, data
// and parameters.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::params::{ClusterParams, Metric};
use super::partition::Partition;
use super::traits::Clusterer;
use crate::error::EngineError;
use crate::store::{validate_documents, Document};

/// Cap for 1/distance so duplicate points don't produce infinities.
const MAX_LAMBDA: f64 = 1e12;

/// The default density clustering strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hdbscan;

impl Clusterer for Hdbscan {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn cluster(&self, docs: &[Document], params: &ClusterParams) -> Result<Partition, EngineError> {
        params.validate()?;
        validate_documents(docs)?;

        if docs.len() < params.min_cluster_size {
            return Err(EngineError::InsufficientData {
                documents: docs.len(),
                min_cluster_size: params.min_cluster_size,
            });
        }

        let points: Vec<&[f64]> = docs.iter().map(|d| d.embedding.as_slice()).collect();
        let labels = hdbscan_labels(&points, params);
        let partition = Partition::from_labels(docs, &labels, params);

        if partition.clusters.is_empty() {
            warn!(
                documents = docs.len(),
                noise_ratio = partition.noise_ratio(),
                "Clustering produced a noise-only partition"
            );
        } else {
            info!(
                documents = docs.len(),
                clusters = partition.clusters.len(),
                noise = partition.noise.size(),
                noise_ratio = partition.noise_ratio(),
                metric = %params.metric,
                "Clustering complete"
            );
        }

        Ok(partition)
    }
}

/// Run HDBSCAN over raw points and return one label per point (`None` = noise).
/// Labels are dense indices into the selected clusters, in hierarchy order.
pub fn hdbscan_labels(points: &[&[f64]], params: &ClusterParams) -> Vec<Option<usize>> {
    let n = points.len();
    if n < 2 {
        return vec![None; n];
    }

    let core = core_distances(points, params.min_samples, params.metric);
    let mst = mutual_reachability_mst(points, &core, params.metric);
    let merges = single_linkage(n, mst);
    let tree = condense_tree(&merges, n, params.min_cluster_size);
    let hierarchy = ClusterHierarchy::new(&tree, n);
    let selected = hierarchy.select(params.cluster_selection_epsilon);

    debug!(
        condensed_edges = tree.len(),
        candidate_clusters = hierarchy.birth.len().saturating_sub(1),
        selected = selected.len(),
        "Condensed tree built"
    );

    hierarchy.label_points(&tree, n, &selected)
}

/// Distance from each point to its `min_samples`-th nearest other point
/// (clamped to the last available neighbour).
fn core_distances(points: &[&[f64]], min_samples: usize, metric: Metric) -> Vec<f64> {
    let n = points.len();
    let k = min_samples.clamp(1, n - 1);
    let mut row = Vec::with_capacity(n - 1);

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            row.clear();
            row.extend(
                points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, q)| metric.distance(p, q)),
            );
            let (_, kth, _) = row.select_nth_unstable_by(k - 1, f64::total_cmp);
            *kth
        })
        .collect()
}

/// Prim's MST over mutual-reachability distances. Returns `(from, to, weight)`.
fn mutual_reachability_mst(points: &[&[f64]], core: &[f64], metric: Metric) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut best_from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[current] = true;

    for _ in 1..n {
        let mut next: Option<usize> = None;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = metric.distance(points[current], points[j]);
            let reach = d.max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                best_from[j] = current;
            }
            match next {
                Some(k) if best[j] >= best[k] => {}
                _ => next = Some(j),
            }
        }
        let Some(next) = next else { break };
        in_tree[next] = true;
        edges.push((best_from[next], next, best[next]));
        current = next;
    }

    edges
}

/// One node of the single-linkage dendrogram. Node ids `< n` are points;
/// merge `k` is node `n + k`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| {
        a.2.total_cmp(&b.2)
            .then_with(|| a.0.min(a.1).cmp(&b.0.min(b.1)))
            .then_with(|| a.0.max(a.1).cmp(&b.0.max(b.1)))
    });

    let total = 2 * n - 1;
    let mut parent: Vec<usize> = (0..total).collect();
    let mut size = vec![1usize; total];
    let mut merges = Vec::with_capacity(n - 1);

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        while parent[x] != root {
            let next = parent[x];
            parent[x] = root;
            x = next;
        }
        root
    }

    for (a, b, w) in edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra == rb {
            continue;
        }
        let node = n + merges.len();
        parent[ra] = node;
        parent[rb] = node;
        size[node] = size[ra] + size[rb];
        merges.push(Merge {
            left: ra,
            right: rb,
            distance: w,
            size: size[node],
        });
    }

    merges
}

/// Edge of the condensed tree. Cluster labels are `>= n` (root is `n`);
/// children `< n` are points falling out of `parent` at `lambda`.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

fn condense_tree(merges: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let total = n + merges.len();
    let root = total - 1;
    let node_size = |id: usize| if id < n { 1 } else { merges[id - n].size };

    let mut relabel = vec![0usize; total];
    let mut ignore = vec![false; total];
    let mut next_label = n + 1;
    relabel[root] = n;
    let mut out = Vec::with_capacity(2 * n);

    // Parents always have larger ids than their children, so walking ids
    // downward visits the dendrogram top-down.
    for node in (n..total).rev() {
        if ignore[node] {
            continue;
        }
        let merge = merges[node - n];
        let lambda = lambda_of(merge.distance);
        let parent = relabel[node];
        let (left, right) = (merge.left, merge.right);
        let (left_size, right_size) = (node_size(left), node_size(right));

        let left_big = left_size >= min_cluster_size;
        let right_big = right_size >= min_cluster_size;

        match (left_big, right_big) {
            (true, true) => {
                for (child, child_size) in [(left, left_size), (right, right_size)] {
                    relabel[child] = next_label;
                    out.push(CondensedEdge {
                        parent,
                        child: next_label,
                        lambda,
                        size: child_size,
                    });
                    next_label += 1;
                }
            }
            (false, false) => {
                for child in [left, right] {
                    for point in drain_subtree(child, n, merges, &mut ignore) {
                        out.push(CondensedEdge {
                            parent,
                            child: point,
                            lambda,
                            size: 1,
                        });
                    }
                }
            }
            (false, true) | (true, false) => {
                let (small, big) = if left_big { (right, left) } else { (left, right) };
                relabel[big] = parent;
                for point in drain_subtree(small, n, merges, &mut ignore) {
                    out.push(CondensedEdge {
                        parent,
                        child: point,
                        lambda,
                        size: 1,
                    });
                }
            }
        }
    }

    out
}

/// Collect the points under `node` and mark its internal nodes as consumed.
fn drain_subtree(node: usize, n: usize, merges: &[Merge], ignore: &mut [bool]) -> Vec<usize> {
    let mut points = Vec::new();
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        if id < n {
            points.push(id);
        } else {
            ignore[id] = true;
            let m = merges[id - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    points
}

/// Cluster-level view of the condensed tree, indexed by `label - n`.
struct ClusterHierarchy {
    n: usize,
    birth: Vec<f64>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    stability: Vec<f64>,
}

impl ClusterHierarchy {
    fn new(tree: &[CondensedEdge], n: usize) -> Self {
        let max_label = tree
            .iter()
            .map(|e| e.parent.max(if e.child >= n { e.child } else { n }))
            .max()
            .unwrap_or(n);
        let count = max_label - n + 1;

        let mut birth = vec![0.0; count];
        let mut parent = vec![None; count];
        let mut children = vec![Vec::new(); count];
        for e in tree.iter().filter(|e| e.child >= n) {
            birth[e.child - n] = e.lambda;
            parent[e.child - n] = Some(e.parent);
            children[e.parent - n].push(e.child);
        }

        let mut stability = vec![0.0; count];
        for e in tree {
            let p = e.parent - n;
            stability[p] += (e.lambda - birth[p]) * e.size as f64;
        }

        Self {
            n,
            birth,
            parent,
            children,
            stability,
        }
    }

    fn root(&self) -> usize {
        self.n
    }

    fn birth_distance(&self, label: usize) -> f64 {
        let lambda = self.birth[label - self.n];
        if lambda > 0.0 {
            1.0 / lambda
        } else {
            f64::INFINITY
        }
    }

    /// Excess-of-mass selection (root excluded), then epsilon merging.
    /// Returns selected labels in ascending order.
    fn select(&self, epsilon: f64) -> Vec<usize> {
        let count = self.birth.len();
        let mut stability = self.stability.clone();
        let mut selected = vec![false; count];

        for idx in (1..count).rev() {
            let subtree: f64 = self.children[idx].iter().map(|&c| stability[c - self.n]).sum();
            if subtree > stability[idx] {
                stability[idx] = subtree;
            } else {
                selected[idx] = true;
                let mut stack: Vec<usize> = self.children[idx].clone();
                while let Some(c) = stack.pop() {
                    selected[c - self.n] = false;
                    stack.extend(self.children[c - self.n].iter().copied());
                }
            }
        }

        let mut chosen: BTreeSet<usize> = (0..count)
            .filter(|&i| selected[i])
            .map(|i| i + self.n)
            .collect();

        if epsilon > 0.0 {
            chosen = chosen
                .into_iter()
                .map(|label| {
                    if self.birth_distance(label) >= epsilon {
                        return label;
                    }
                    let mut node = label;
                    loop {
                        let Some(p) = self.parent[node - self.n] else { break node };
                        if p == self.root() {
                            break node;
                        }
                        if self.birth_distance(p) > epsilon {
                            break p;
                        }
                        node = p;
                    }
                })
                .collect();
            // Drop anything already covered by a chosen ancestor.
            let snapshot = chosen.clone();
            chosen.retain(|&label| {
                let mut cur = self.parent[label - self.n];
                while let Some(p) = cur {
                    if snapshot.contains(&p) {
                        return false;
                    }
                    cur = self.parent[p - self.n];
                }
                true
            });
        }

        chosen.into_iter().collect()
    }

    fn label_points(&self, tree: &[CondensedEdge], n: usize, selected: &[usize]) -> Vec<Option<usize>> {
        let mut labels = vec![None; n];
        for e in tree.iter().filter(|e| e.child < n) {
            let mut cur = Some(e.parent);
            while let Some(c) = cur {
                if let Ok(pos) = selected.binary_search(&c) {
                    labels[e.child] = Some(pos);
                    break;
                }
                cur = self.parent[c - n];
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: &[f64], offsets: &[(usize, f64)]) -> Vec<Vec<f64>> {
        offsets
            .iter()
            .map(|&(axis, delta)| {
                let mut v = center.to_vec();
                v[axis] += delta;
                v
            })
            .collect()
    }

    fn labels_for(points: &[Vec<f64>], params: &ClusterParams) -> Vec<Option<usize>> {
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        hdbscan_labels(&refs, params)
    }

    #[test]
    fn test_core_distances_use_kth_neighbour() {
        let pts: Vec<Vec<f64>> = vec![vec![0.0], vec![1.0], vec![3.0]];
        let refs: Vec<&[f64]> = pts.iter().map(|p| p.as_slice()).collect();
        let core = core_distances(&refs, 1, Metric::Euclidean);
        assert_eq!(core, vec![1.0, 1.0, 2.0]);
        let core2 = core_distances(&refs, 2, Metric::Euclidean);
        assert_eq!(core2, vec![3.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mst_has_n_minus_one_edges() {
        let pts: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64 * 1.5, 0.0]).collect();
        let refs: Vec<&[f64]> = pts.iter().map(|p| p.as_slice()).collect();
        let core = core_distances(&refs, 1, Metric::Euclidean);
        let mst = mutual_reachability_mst(&refs, &core, Metric::Euclidean);
        assert_eq!(mst.len(), 5);
        assert!(mst.iter().all(|&(_, _, w)| (w - 1.5).abs() < 1e-12));
    }

    #[test]
    fn test_two_separated_blobs() {
        let mut pts = blob(&[0.0, 0.0], &[(0, 0.0), (0, 0.1), (1, 0.1), (0, -0.1), (1, -0.1)]);
        pts.extend(blob(&[10.0, 10.0], &[(0, 0.0), (0, 0.1), (1, 0.1), (0, -0.1), (1, -0.1)]));
        let params = ClusterParams {
            min_cluster_size: 3,
            min_samples: 2,
            ..Default::default()
        };
        let labels = labels_for(&pts, &params);
        assert!(labels.iter().all(|l| l.is_some()));
        assert!(labels[..5].iter().all(|l| *l == labels[0]));
        assert!(labels[5..].iter().all(|l| *l == labels[5]));
        assert_ne!(labels[0], labels[5]);
    }

    #[test]
    fn test_uniform_blob_without_split_is_noise() {
        // A single blob never splits into two qualifying children, and the
        // root is not eligible for selection.
        let pts = blob(&[0.0, 0.0], &[(0, 0.0), (0, 0.1), (1, 0.1), (0, -0.1), (1, -0.1)]);
        let params = ClusterParams {
            min_cluster_size: 3,
            min_samples: 2,
            ..Default::default()
        };
        let labels = labels_for(&pts, &params);
        assert!(labels.iter().all(|l| l.is_none()));
    }

    #[test]
    fn test_epsilon_merges_close_clusters() {
        // Two tight pairs-of-three 1.0 apart, far from a third group.
        let mut pts = blob(&[0.0, 0.0], &[(0, 0.0), (0, 0.01), (1, 0.01)]);
        pts.extend(blob(&[1.0, 0.0], &[(0, 0.0), (0, 0.01), (1, 0.01)]));
        pts.extend(blob(&[50.0, 50.0], &[(0, 0.0), (0, 0.01), (1, 0.01)]));
        let params = ClusterParams {
            min_cluster_size: 3,
            min_samples: 2,
            ..Default::default()
        };
        let fine = labels_for(&pts, &params);
        let distinct: BTreeSet<_> = fine.iter().flatten().collect();
        assert_eq!(distinct.len(), 3);

        let merged = labels_for(
            &pts,
            &ClusterParams {
                cluster_selection_epsilon: 5.0,
                ..params
            },
        );
        let distinct: BTreeSet<_> = merged.iter().flatten().collect();
        assert_eq!(distinct.len(), 2);
        assert!(merged[..6].iter().all(|l| *l == merged[0]));
    }

    #[test]
    fn test_labels_are_deterministic() {
        let mut pts = blob(&[0.0, 0.0], &[(0, 0.0), (0, 0.2), (1, 0.2), (0, -0.2)]);
        pts.extend(blob(&[3.0, 3.0], &[(0, 0.0), (0, 0.2), (1, 0.2), (0, -0.2)]));
        pts.push(vec![40.0, -40.0]);
        let params = ClusterParams {
            min_cluster_size: 3,
            min_samples: 2,
            ..Default::default()
        };
        assert_eq!(labels_for(&pts, &params), labels_for(&pts, &params));
    }

    #[test]
    fn test_insufficient_data_error() {
        let docs: Vec<Document> = (0..2)
            .map(|i| Document {
                doc_id: format!("d{i}"),
                embedding: vec![i as f64],
                engagement_weight: 0.0,
                timestamp: chrono::Utc::now(),
                text: String::new(),
            })
            .collect();
        let err = Hdbscan.cluster(&docs, &ClusterParams::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData {
                documents: 2,
                min_cluster_size: 5
            }
        ));
    }
}

//! Cluster engine — density-reachability clustering with noise labeling.
//!
//! Groups message vectors into dense topical clusters. A point is dense
//! when it has `min_samples` neighbors within the reach radius under the
//! mutual-reachability distance max(d(a,b), core(a), core(b)), where
//! core(x) is the distance to the min_samples-th nearest neighbor. The
//! radius itself is derived from the core-distance distribution (quantile
//! times a fixed scale), so sparsely scattered points never chain into the
//! dense regions.
//!
//! Deterministic by construction: points are visited in input order,
//! expansion queues neighbors in ascending index order, and cluster ids
//! follow the index order of each cluster's seed (its first dense point).

use crate::config::{ClusteringConfig, DistanceMetric};
use crate::constants::{CORE_DISTANCE_QUANTILE, REACH_SCALE};
use crate::{AnalysisError, AnalysisResult};

/// Assignment label for one input index.
pub const NOISE: i32 = -1;

/// One dense cluster, local to a single run.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_id: usize,
    /// Indices into the input vector slice, ascending.
    pub member_indices: Vec<usize>,
}

/// Full clustering result.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    /// Per-input label: cluster id or `NOISE`.
    pub labels: Vec<i32>,
    /// Non-noise clusters, in seed discovery order.
    pub clusters: Vec<Cluster>,
    pub noise_count: usize,
}

/// Cluster a batch of embedding vectors.
///
/// Fewer than `min_cluster_size` inputs yield all-noise with zero clusters
/// rather than an error; the orchestrator decides whether that is fatal.
pub fn cluster(vectors: &[Vec<f32>], config: &ClusteringConfig) -> AnalysisResult<ClusterOutcome> {
    validate(config)?;

    let n = vectors.len();
    if n < config.min_cluster_size {
        tracing::debug!(points = n, min_cluster_size = config.min_cluster_size, "Too few points, all noise");
        return Ok(all_noise(n));
    }

    let distances = pairwise_distances(vectors, config.metric);
    let core = core_distances(&distances, n, config.min_samples);
    let radius = reach_radius(&core);

    tracing::debug!(points = n, radius = format!("{:.4}", radius).as_str(), "Density scan starting");

    let labels = density_scan(&distances, &core, n, radius, config.min_samples);
    let outcome = collect(labels, n, config.min_cluster_size);

    tracing::info!(
        points = n,
        clusters = outcome.clusters.len(),
        noise = outcome.noise_count,
        "Clustering complete"
    );
    Ok(outcome)
}

fn validate(config: &ClusteringConfig) -> AnalysisResult<()> {
    if config.min_cluster_size < 2 {
        return Err(AnalysisError::ConfigurationError(format!(
            "min_cluster_size must be >= 2, got {}",
            config.min_cluster_size
        )));
    }
    if config.min_samples < 1 {
        return Err(AnalysisError::ConfigurationError(
            "min_samples must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn all_noise(n: usize) -> ClusterOutcome {
    ClusterOutcome {
        labels: vec![NOISE; n],
        clusters: Vec::new(),
        noise_count: n,
    }
}

/// Flat row-major condensed distance matrix.
fn pairwise_distances(vectors: &[Vec<f32>], metric: DistanceMetric) -> Vec<f64> {
    let n = vectors.len();
    let mut distances = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = match metric {
                DistanceMetric::Cosine => cosine_distance(&vectors[i], &vectors[j]),
                DistanceMetric::Euclidean => euclidean_distance(&vectors[i], &vectors[j]),
            };
            distances[i * n + j] = d;
            distances[j * n + i] = d;
        }
    }
    distances
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - crate::processing::embeddings::cosine_similarity(a, b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// core(i) = distance to the min_samples-th nearest other point.
fn core_distances(distances: &[f64], n: usize, min_samples: usize) -> Vec<f64> {
    let mut core = vec![f64::INFINITY; n];
    for i in 0..n {
        let mut row: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| distances[i * n + j]).collect();
        row.sort_by(|a, b| a.total_cmp(b));
        let k = min_samples.min(row.len());
        if k > 0 {
            core[i] = row[k - 1];
        }
    }
    core
}

/// Reach radius derived from the core-distance distribution: the quantile
/// core distance scaled by a fixed factor. Adapts to the density of the
/// data instead of requiring a hand-tuned epsilon.
fn reach_radius(core: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = core.iter().copied().filter(|d| d.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * CORE_DISTANCE_QUANTILE).floor() as usize;
    sorted[idx] * REACH_SCALE
}

fn mutual_reachability(distances: &[f64], core: &[f64], n: usize, i: usize, j: usize) -> f64 {
    distances[i * n + j].max(core[i]).max(core[j])
}

/// Neighbors of `i` within the radius under mutual reachability, ascending
/// index order. A point with a large core distance has no neighbors at all,
/// which keeps scattered points out of every cluster.
fn neighbors_of(
    distances: &[f64],
    core: &[f64],
    n: usize,
    i: usize,
    radius: f64,
) -> Vec<usize> {
    (0..n)
        .filter(|&j| j != i && mutual_reachability(distances, core, n, i, j) <= radius)
        .collect()
}

/// Density scan in strict index order: each unvisited dense point seeds a
/// cluster and expands through density-connected dense points; border
/// points join the first cluster that reaches them.
fn density_scan(
    distances: &[f64],
    core: &[f64],
    n: usize,
    radius: f64,
    min_samples: usize,
) -> Vec<i32> {
    let mut labels = vec![NOISE; n];
    let mut visited = vec![false; n];
    let mut next_cluster: i32 = 0;

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let seed_neighbors = neighbors_of(distances, core, n, seed, radius);
        if seed_neighbors.len() < min_samples {
            continue; // not dense; stays noise unless a cluster reaches it
        }

        let cluster_id = next_cluster;
        next_cluster += 1;
        labels[seed] = cluster_id;

        let mut queue: std::collections::VecDeque<usize> = seed_neighbors.into();
        while let Some(p) = queue.pop_front() {
            if labels[p] == NOISE {
                labels[p] = cluster_id;
            }
            if visited[p] {
                continue;
            }
            visited[p] = true;

            let p_neighbors = neighbors_of(distances, core, n, p, radius);
            if p_neighbors.len() >= min_samples {
                // p is dense itself: expansion continues through it
                for q in p_neighbors {
                    if !visited[q] || labels[q] == NOISE {
                        queue.push_back(q);
                    }
                }
            }
        }
    }

    labels
}

/// Demote undersized clusters to noise and renumber the survivors,
/// preserving seed discovery order.
fn collect(mut labels: Vec<i32>, n: usize, min_cluster_size: usize) -> ClusterOutcome {
    let max_label = labels.iter().copied().max().unwrap_or(NOISE);
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); (max_label + 1).max(0) as usize];
    for (i, &label) in labels.iter().enumerate() {
        if label >= 0 {
            members[label as usize].push(i);
        }
    }

    let mut clusters = Vec::new();
    let mut remap = vec![NOISE; members.len()];
    let mut next_id = 0usize;
    // Labels were assigned in seed order; the remap only closes gaps left
    // by demoted clusters.
    for (old_id, member_indices) in members.into_iter().enumerate() {
        if member_indices.len() >= min_cluster_size {
            remap[old_id] = next_id as i32;
            clusters.push(Cluster {
                cluster_id: next_id,
                member_indices,
            });
            next_id += 1;
        }
    }

    for label in labels.iter_mut() {
        *label = if *label >= 0 { remap[*label as usize] } else { NOISE };
    }

    let noise_count = labels.iter().filter(|&&l| l == NOISE).count();
    debug_assert_eq!(labels.len(), n);

    ClusterOutcome {
        labels,
        clusters,
        noise_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_cluster_size: usize) -> ClusteringConfig {
        ClusteringConfig {
            min_cluster_size,
            min_samples: 2,
            metric: DistanceMetric::Euclidean,
        }
    }

    /// Tight blob of `count` points around (cx, cy) with a deterministic
    /// sub-pattern, padded to dim 4.
    fn blob(cx: f32, cy: f32, count: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|i| {
                let dx = (i % 5) as f32 * 0.01;
                let dy = (i / 5) as f32 * 0.01;
                vec![cx + dx, cy + dy, 0.0, 0.0]
            })
            .collect()
    }

    #[test]
    fn test_rejects_min_cluster_size_below_2() {
        let err = cluster(&blob(0.0, 0.0, 10), &config(1)).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigurationError(_)));
    }

    #[test]
    fn test_two_blobs_recovered() {
        let mut vectors = blob(0.0, 0.0, 10);
        vectors.extend(blob(10.0, 10.0, 10));
        let outcome = cluster(&vectors, &config(8)).unwrap();
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.noise_count, 0);
        // First cluster contains index 0, second starts at index 10
        assert_eq!(outcome.clusters[0].member_indices, (0..10).collect::<Vec<_>>());
        assert_eq!(outcome.clusters[1].member_indices, (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_dense_region_among_scatter() {
        // One tight region of 10 plus widely scattered singles
        let mut vectors = blob(0.0, 0.0, 10);
        for i in 0..8 {
            let a = 50.0 + 40.0 * i as f32;
            vectors.push(vec![a, -a, a * 0.5, 7.0 + a]);
        }
        let outcome = cluster(&vectors, &config(8)).unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].member_indices, (0..10).collect::<Vec<_>>());
        for i in 10..18 {
            assert_eq!(outcome.labels[i], NOISE);
        }
        assert_eq!(outcome.noise_count, 8);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let mut vectors = blob(0.0, 0.0, 12);
        vectors.extend(blob(5.0, 5.0, 9));
        vectors.push(vec![100.0, 100.0, 100.0, 100.0]);
        let a = cluster(&vectors, &config(8)).unwrap();
        let b = cluster(&vectors, &config(8)).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_too_few_points_all_noise() {
        let outcome = cluster(&blob(0.0, 0.0, 5), &config(8)).unwrap();
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.noise_count, 5);
        assert!(outcome.labels.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_identical_points_form_one_cluster() {
        let vectors: Vec<Vec<f32>> = (0..9).map(|_| vec![1.0, 2.0, 3.0, 4.0]).collect();
        let outcome = cluster(&vectors, &config(8)).unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].member_indices.len(), 9);
    }

    #[test]
    fn test_empty_input() {
        let outcome = cluster(&[], &config(8)).unwrap();
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.noise_count, 0);
    }
}

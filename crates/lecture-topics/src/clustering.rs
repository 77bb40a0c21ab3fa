//! Embedding clustering strategies.
//!
//! Both strategies take an n×d matrix (one row per chunk) and return one
//! label per row. HDBSCAN marks noise with [`NOISE`]; k-means labels every
//! row.

use std::collections::BTreeMap;
use std::sync::Arc;

use hdbscan::{DistanceMetric, Hdbscan, HdbscanHyperParams, NnAlgorithm};
use lecture_types::similarity::squared_euclidean;
use lecture_types::{ClusteringMethod, TopicsSettings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::TopicsError;

/// Label given to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// A clustering strategy.
pub trait Clusterer: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Assign a label to every row of `data`.
    fn cluster(&self, data: &[Vec<f32>]) -> Result<Vec<i32>, TopicsError>;
}

/// Build the clusterer selected in settings.
pub fn build_clusterer(settings: &TopicsSettings) -> Arc<dyn Clusterer> {
    match settings.clustering_method {
        ClusteringMethod::Hdbscan => Arc::new(HdbscanClusterer::new(
            settings.min_cluster_size,
            settings.min_samples,
        )),
        ClusteringMethod::KMeans => Arc::new(KMeansClusterer::new(
            settings.seed,
            settings.kmeans_max_iterations,
            settings.kmeans_n_init,
        )),
    }
}

/// Group row indices by label, dropping noise and groups smaller than
/// `min_size`. Groups are keyed by label in ascending order.
pub fn group_by_label(labels: &[i32], min_size: usize) -> BTreeMap<i32, Vec<usize>> {
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        if label != NOISE {
            groups.entry(label).or_default().push(index);
        }
    }
    groups.retain(|_, members| members.len() >= min_size);
    groups
}

// ===== HDBSCAN =====

/// Density-based clustering with Euclidean distance.
pub struct HdbscanClusterer {
    min_cluster_size: usize,
    min_samples: usize,
}

impl HdbscanClusterer {
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples,
        }
    }
}

impl Clusterer for HdbscanClusterer {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn cluster(&self, data: &[Vec<f32>]) -> Result<Vec<i32>, TopicsError> {
        if data.len() < self.min_cluster_size.max(2) {
            return Ok(vec![NOISE; data.len()]);
        }

        // Core distances need at least one neighbour besides the point itself
        let min_samples = self.min_samples.clamp(1, data.len() - 1);
        let params = HdbscanHyperParams::builder()
            .min_cluster_size(self.min_cluster_size)
            .min_samples(min_samples)
            .dist_metric(DistanceMetric::Euclidean)
            .nn_algorithm(NnAlgorithm::BruteForce)
            .build();

        let labels = Hdbscan::new(data, params)
            .cluster()
            .map_err(|e| TopicsError::Clustering(format!("{e:?}")))?;

        debug!(
            points = data.len(),
            noise = labels.iter().filter(|&&l| l == NOISE).count(),
            "HDBSCAN complete"
        );
        Ok(labels)
    }
}

// ===== k-means =====

/// Number of k-means clusters for `n` points: ⌈√(n/2)⌉ clamped to 3..=20,
/// never more than `n`.
pub fn kmeans_k(n: usize) -> usize {
    let k = (n as f64 / 2.0).sqrt().ceil() as usize;
    k.clamp(3, 20).min(n)
}

/// Seeded k-means with k-means++ initialisation and several restarts.
///
/// Identical input and seed always produce identical labels.
pub struct KMeansClusterer {
    seed: u64,
    max_iterations: usize,
    n_init: usize,
}

impl KMeansClusterer {
    pub fn new(seed: u64, max_iterations: usize, n_init: usize) -> Self {
        Self {
            seed,
            max_iterations: max_iterations.max(1),
            n_init: n_init.max(1),
        }
    }

    /// One k-means run. Returns labels and inertia.
    fn run(&self, data: &[Vec<f32>], k: usize, rng: &mut StdRng) -> (Vec<usize>, f64) {
        let mut centroids = init_plus_plus(data, k, rng);
        let mut labels = vec![usize::MAX; data.len()];

        for _ in 0..self.max_iterations {
            let mut changed = false;
            for (label, point) in labels.iter_mut().zip(data) {
                let nearest = nearest_centroid(point, &centroids);
                if *label != nearest {
                    *label = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            update_centroids(data, &labels, &mut centroids);
        }

        let inertia = labels
            .iter()
            .zip(data)
            .map(|(&label, point)| squared_euclidean(point, &centroids[label]))
            .sum();
        (labels, inertia)
    }
}

impl Clusterer for KMeansClusterer {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn cluster(&self, data: &[Vec<f32>]) -> Result<Vec<i32>, TopicsError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let dimension = data[0].len();
        if data.iter().any(|row| row.len() != dimension) {
            return Err(TopicsError::Clustering(
                "rows have different dimensions".to_string(),
            ));
        }

        let k = kmeans_k(data.len());
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut best: Option<(Vec<usize>, f64)> = None;
        for _ in 0..self.n_init {
            let (labels, inertia) = self.run(data, k, &mut rng);
            if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
                best = Some((labels, inertia));
            }
        }

        let (labels, inertia) = best.unwrap_or_default();
        debug!(points = data.len(), k, inertia, "k-means complete");
        Ok(labels.into_iter().map(|l| l as i32).collect())
    }
}

/// k-means++ seeding: each further centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen one.
fn init_plus_plus(data: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..n)].clone());

    while centroids.len() < k {
        let distances: Vec<f64> = data
            .iter()
            .map(|point| {
                centroids
                    .iter()
                    .map(|c| squared_euclidean(point, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = n - 1;
            for (index, &d) in distances.iter().enumerate() {
                if target < d {
                    chosen = index;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // Every point sits on a centroid already
            centroids.len() % n
        };
        centroids.push(data[next].clone());
    }
    centroids
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_euclidean(point, centroid);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

/// Move each centroid to the mean of its members. Empty clusters keep
/// their previous centroid.
fn update_centroids(data: &[Vec<f32>], labels: &[usize], centroids: &mut [Vec<f32>]) {
    let dimension = centroids.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0f64; dimension]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (&label, point) in labels.iter().zip(data) {
        counts[label] += 1;
        for (sum, &value) in sums[label].iter_mut().zip(point) {
            *sum += f64::from(value);
        }
    }

    for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(&counts) {
        if count > 0 {
            *centroid = sum.into_iter().map(|s| (s / count as f64) as f32).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight blobs far apart in 2-D.
    fn two_blobs() -> Vec<Vec<f32>> {
        let mut data = Vec::new();
        for i in 0..6 {
            let jitter = i as f32 * 0.01;
            data.push(vec![0.0 + jitter, 0.0 - jitter]);
        }
        for i in 0..6 {
            let jitter = i as f32 * 0.01;
            data.push(vec![10.0 + jitter, 10.0 - jitter]);
        }
        data
    }

    #[test]
    fn test_kmeans_k() {
        assert_eq!(kmeans_k(2), 2);
        assert_eq!(kmeans_k(6), 3);
        assert_eq!(kmeans_k(50), 5);
        assert_eq!(kmeans_k(51), 6);
        assert_eq!(kmeans_k(10_000), 20);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let data = two_blobs();
        let clusterer = KMeansClusterer::new(42, 300, 10);
        let first = clusterer.cluster(&data).unwrap();
        let second = clusterer.cluster(&data).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), data.len());
        assert!(first.iter().all(|&l| (0..3).contains(&l)));
    }

    #[test]
    fn test_kmeans_never_mixes_blobs() {
        let data = two_blobs();
        let labels = KMeansClusterer::new(7, 300, 10).cluster(&data).unwrap();
        for a in &labels[..6] {
            for b in &labels[6..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_kmeans_identical_points_share_label() {
        let data = vec![vec![0.5, 0.5, 0.5]; 6];
        let labels = KMeansClusterer::new(42, 300, 10).cluster(&data).unwrap();
        assert_eq!(labels, vec![0; 6]);
    }

    #[test]
    fn test_kmeans_rejects_ragged_rows() {
        let data = vec![vec![0.0, 1.0], vec![1.0]];
        assert!(matches!(
            KMeansClusterer::new(1, 10, 1).cluster(&data),
            Err(TopicsError::Clustering(_))
        ));
    }

    #[test]
    fn test_kmeans_empty_input() {
        assert!(KMeansClusterer::new(1, 10, 1).cluster(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_hdbscan_finds_both_blobs() {
        let labels = HdbscanClusterer::new(3, 2).cluster(&two_blobs()).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);
        assert_eq!(group_by_label(&labels, 3).len(), 2);
    }

    #[test]
    fn test_hdbscan_identical_points_are_noise() {
        let data = vec![vec![0.6, 0.8, 0.0]; 6];
        let labels = HdbscanClusterer::new(3, 2).cluster(&data).unwrap();
        assert_eq!(labels, vec![NOISE; 6]);
    }

    #[test]
    fn test_hdbscan_too_few_points_is_noise() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let labels = HdbscanClusterer::new(3, 2).cluster(&data).unwrap();
        assert_eq!(labels, vec![NOISE, NOISE]);
    }

    #[test]
    fn test_group_by_label_drops_noise_and_small_groups() {
        let labels = vec![0, 0, 1, NOISE, 0, 2, 2, 2, 1];
        let groups = group_by_label(&labels, 3);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&0], vec![0, 1, 4]);
        assert_eq!(groups[&2], vec![5, 6, 7]);
    }

    #[test]
    fn test_build_clusterer_follows_settings() {
        let mut settings = TopicsSettings::default();
        assert_eq!(build_clusterer(&settings).name(), "hdbscan");
        settings.clustering_method = ClusteringMethod::KMeans;
        assert_eq!(build_clusterer(&settings).name(), "kmeans");
    }
}

//! K-Means clustering model implementation

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::SegmentationError;
use crate::features::{CustomerFeatureVector, Feature};
use crate::persona::PersonaCentroid;
use crate::scaler::{ensure_finite, Imputer, Standardizer};

/// One fitted K-Means partition of the standardized population
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignment per row, numbered by first appearance
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space, in label order
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// Mean silhouette coefficient over every row
    pub silhouette: f64,
}

impl KMeansFit {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Fit K-Means on a standardized matrix
///
/// # Arguments
/// * `features` - Standardized feature matrix, one row per customer
/// * `n_clusters` - Number of clusters
/// * `config` - Seed, iteration limit, tolerance and restart count
///
/// # Returns
/// * `KMeansFit` with canonical labels, centroids and quality metrics
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &PipelineConfig,
) -> crate::Result<KMeansFit> {
    if features.nrows() < n_clusters {
        return Err(SegmentationError::InsufficientData {
            customers: features.nrows(),
            required: n_clusters,
        });
    }

    let dataset = DatasetBase::from(features.clone());
    let rng = Pcg64Mcg::seed_from_u64(config.seed);

    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .n_runs(config.n_runs)
        .fit(&dataset)
        .map_err(|e| SegmentationError::computation(format!("k-means fit with k={}", n_clusters), e.to_string()))?;

    let raw_labels: Array1<usize> = model.predict(features);
    let (labels, centroids) = canonicalize(&raw_labels, model.centroids());

    let inertia = compute_inertia(features, &labels, &centroids);
    let silhouette = silhouette_score(features, &labels, n_clusters);

    Ok(KMeansFit {
        n_clusters,
        labels,
        centroids,
        inertia,
        silhouette,
    })
}

/// Renumber clusters by first appearance in row order so that indices do not
/// depend on the fitting library's internal ordering. Clusters no row is
/// assigned to keep their relative order after the populated ones.
fn canonicalize(labels: &Array1<usize>, centroids: &Array2<f64>) -> (Array1<usize>, Array2<f64>) {
    let k = centroids.nrows();
    let mut order: Vec<usize> = Vec::with_capacity(k);
    for &label in labels.iter() {
        if !order.contains(&label) {
            order.push(label);
        }
    }
    for old in 0..k {
        if !order.contains(&old) {
            order.push(old);
        }
    }

    let mut remap = vec![0; k];
    for (new, &old) in order.iter().enumerate() {
        remap[old] = new;
    }

    let relabelled = labels.mapv(|old| remap[old]);
    let mut reordered = Array2::zeros(centroids.dim());
    for (new, &old) in order.iter().enumerate() {
        reordered.row_mut(new).assign(&centroids.row(old));
    }

    (relabelled, reordered)
}

/// Mean silhouette coefficient.
///
/// Rows in a singleton cluster score 0, as does a partition with fewer than
/// two populated clusters.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>, n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    let populated = {
        let mut seen = vec![false; n_clusters];
        for &label in labels.iter() {
            if label < n_clusters {
                seen[label] = true;
            }
        }
        seen.iter().filter(|&&s| s).count()
    };
    if n_samples < 2 || populated < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        let mut same_cluster_sum = 0.0;
        let mut same_cluster_count = 0usize;
        let mut other_sums = vec![0.0; n_clusters];
        let mut other_counts = vec![0usize; n_clusters];

        for j in 0..n_samples {
            if i == j {
                continue;
            }
            let distance = euclidean_distance(&point, &features.row(j));
            let other_label = labels[j];

            if other_label == cluster_label {
                same_cluster_sum += distance;
                same_cluster_count += 1;
            } else if other_label < n_clusters {
                other_sums[other_label] += distance;
                other_counts[other_label] += 1;
            }
        }

        if same_cluster_count == 0 {
            continue;
        }
        let a_i = same_cluster_sum / same_cluster_count as f64;

        // b(i): min mean distance to points in other clusters
        let b_i = other_sums
            .iter()
            .zip(&other_counts)
            .filter(|(_, count)| **count > 0)
            .map(|(sum, count)| sum / *count as f64)
            .fold(f64::INFINITY, f64::min);

        let max_ab = a_i.max(b_i);
        if b_i.is_finite() && max_ab > 0.0 {
            silhouette_sum += (b_i - a_i) / max_ab;
        }
    }

    silhouette_sum / n_samples as f64
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let distance = euclidean_distance(&features.row(i), &centroids.row(cluster));
            inertia += distance * distance;
        }
    }

    inertia
}

/// Calculate Euclidean distance between two points
pub fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Persona assigned to one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub customer_id: String,
    pub cluster: usize,
    pub persona: String,
    /// Euclidean distance to the cluster centroid in standardized space;
    /// larger means a weaker fit
    pub distance: f64,
}

/// Everything needed to score customers against a finished run.
///
/// Produced once by the segmenter and never mutated; scoring borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationModel {
    pub feature_names: Vec<String>,
    pub imputer: Imputer,
    pub scaler: Standardizer,
    /// Centroids in standardized space, one row per cluster
    pub centroids: Array2<f64>,
    pub personas: Vec<PersonaCentroid>,
    pub n_clusters: usize,
    pub seed: u64,
    pub silhouette: f64,
    pub inertia: f64,
}

impl SegmentationModel {
    /// Nearest centroid and its distance; ties go to the lower index.
    pub fn nearest_centroid(&self, point: &ArrayView1<f64>) -> (usize, f64) {
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(point, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        (closest_cluster, min_distance)
    }

    /// Assign a customer to the closest cluster of this model
    pub fn score(&self, vector: &CustomerFeatureVector) -> crate::Result<ClusterAssignment> {
        let expected: Vec<&str> = Feature::ALL.iter().map(Feature::name).collect();
        if self.feature_names != expected || self.centroids.ncols() != expected.len() {
            return Err(SegmentationError::computation(
                "model scoring",
                format!(
                    "model was built for features {:?}, this build extracts {:?}",
                    self.feature_names, expected
                ),
            ));
        }

        let standardized = self
            .scaler
            .transform_row(self.imputer.row(vector).view())
            .insert_axis(ndarray::Axis(0));
        ensure_finite(&standardized, std::slice::from_ref(&vector.customer_id))?;

        let (cluster, distance) = self.nearest_centroid(&standardized.row(0));
        let persona = self
            .personas
            .iter()
            .find(|p| p.cluster == cluster)
            .map(|p| p.persona.clone())
            .ok_or_else(|| {
                SegmentationError::computation("model scoring", format!("no persona for cluster {}", cluster))
            })?;

        Ok(ClusterAssignment {
            customer_id: vector.customer_id.clone(),
            cluster,
            persona,
            distance,
        })
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Model saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let model = Self::from_json(&std::fs::read_to_string(path.as_ref())?)?;
        log::info!("Model loaded from {}", path.as_ref().display());
        Ok(model)
    }
}

//! Population segmentation: standardize, pick k, fit, label personas

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::error::SegmentationError;
use crate::features::{CustomerFeatureVector, Feature, FeatureExtractor};
use crate::model::{euclidean_distance, fit_kmeans, ClusterAssignment, KMeansFit, SegmentationModel};
use crate::persona::{FeatureSpread, PersonaCentroid};
use crate::scaler::{ensure_finite, Imputer, Standardizer};
use crate::transaction::RawTransaction;

/// Output of one pipeline run. Replaces any earlier run wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub assignments: Vec<ClusterAssignment>,
    pub centroids: Vec<PersonaCentroid>,
    pub model: SegmentationModel,
}

impl Segmentation {
    pub fn assignment(&self, customer_id: &str) -> Option<&ClusterAssignment> {
        self.assignments.iter().find(|a| a.customer_id == customer_id)
    }
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    config: PipelineConfig,
}

impl Segmenter {
    pub fn new(config: PipelineConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Cluster a customer population and label each cluster.
    ///
    /// Either every customer gets an assignment or an error is returned.
    pub fn segment(&self, vectors: &[CustomerFeatureVector]) -> crate::Result<Segmentation> {
        let required = self.config.min_customers();
        if vectors.len() < required {
            return Err(SegmentationError::InsufficientData {
                customers: vectors.len(),
                required,
            });
        }

        let customer_ids: Vec<String> = vectors.iter().map(|v| v.customer_id.clone()).collect();

        let imputer = Imputer::fit(vectors);
        let raw = imputer.matrix(vectors);

        let scaler = Standardizer::fit(&raw);
        if scaler.is_degenerate() {
            return Err(SegmentationError::DegenerateInput);
        }

        let standardized = scaler.transform(&raw);
        ensure_finite(&standardized, &customer_ids)?;

        let fit = self.select_fit(&standardized)?;
        log::info!(
            "Segmented {} customers into {} clusters (silhouette {:.3}, inertia {:.2})",
            vectors.len(),
            fit.n_clusters,
            fit.silhouette,
            fit.inertia
        );

        let centroids = self.persona_centroids(vectors, &fit, &scaler);

        let assignments = vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| {
                let cluster = fit.labels[i];
                ClusterAssignment {
                    customer_id: vector.customer_id.clone(),
                    cluster,
                    persona: centroids[cluster].persona.clone(),
                    distance: euclidean_distance(&standardized.row(i), &fit.centroids.row(cluster)),
                }
            })
            .collect();

        let model = SegmentationModel {
            feature_names: Feature::ALL.iter().map(|f| f.name().to_string()).collect(),
            imputer,
            scaler,
            centroids: fit.centroids.clone(),
            personas: centroids.clone(),
            n_clusters: fit.n_clusters,
            seed: self.config.seed,
            silhouette: fit.silhouette,
            inertia: fit.inertia,
        };

        Ok(Segmentation {
            assignments,
            centroids,
            model,
        })
    }

    /// Fit every candidate k and keep the best silhouette; ties keep the
    /// smaller k.
    fn select_fit(&self, standardized: &Array2<f64>) -> crate::Result<KMeansFit> {
        let distinct = count_distinct_rows(standardized);
        let candidates = self.config.cluster_candidates(standardized.nrows());

        let usable: Vec<usize> = candidates.iter().copied().filter(|&k| k <= distinct).collect();
        if usable.is_empty() {
            let required = candidates.first().copied().unwrap_or_else(|| self.config.min_customers());
            log::warn!(
                "only {} distinct feature vectors, cannot form {} clusters",
                distinct,
                required
            );
            return Err(SegmentationError::InsufficientData {
                customers: distinct,
                required,
            });
        }

        let mut fits = Vec::with_capacity(usable.len());
        for k in usable {
            let fit = fit_kmeans(standardized, k, &self.config)?;
            log::debug!(
                "k={}: silhouette {:.4}, inertia {:.2}, sizes {:?}",
                k,
                fit.silhouette,
                fit.inertia,
                fit.cluster_sizes()
            );
            fits.push(fit);
        }

        best_by_silhouette(fits)
            .ok_or_else(|| SegmentationError::computation("cluster count selection", "no candidate was fitted"))
    }

    fn persona_centroids(
        &self,
        vectors: &[CustomerFeatureVector],
        fit: &KMeansFit,
        scaler: &Standardizer,
    ) -> Vec<PersonaCentroid> {
        let sizes = fit.cluster_sizes();

        (0..fit.n_clusters)
            .map(|cluster| {
                let members: Vec<&CustomerFeatureVector> = vectors
                    .iter()
                    .zip(fit.labels.iter())
                    .filter(|(_, label)| **label == cluster)
                    .map(|(v, _)| v)
                    .collect();

                let mut means: BTreeMap<Feature, Option<f64>> = BTreeMap::new();
                let mut spread: BTreeMap<Feature, Option<FeatureSpread>> = BTreeMap::new();
                if members.is_empty() {
                    log::warn!("cluster {} is empty; describing it by its fitted centroid", cluster);
                    let original = scaler.inverse_transform_row(fit.centroids.row(cluster));
                    for &f in Feature::ALL.iter() {
                        means.insert(f, Some(original[f.index()]));
                        spread.insert(f, None);
                    }
                } else {
                    for &f in Feature::ALL.iter() {
                        let values: Vec<f64> = members.iter().filter_map(|v| v.get(f)).collect();
                        let mean = if values.is_empty() {
                            None
                        } else {
                            Some(values.iter().sum::<f64>() / values.len() as f64)
                        };
                        means.insert(f, mean);
                        spread.insert(f, FeatureSpread::of(&values));
                    }
                }

                let persona = self
                    .config
                    .personas
                    .assign(|f| means.get(&f).copied().flatten())
                    .to_string();
                log::debug!("cluster {}: {} customers, persona '{}'", cluster, sizes[cluster], persona);

                PersonaCentroid {
                    cluster,
                    persona,
                    size: sizes[cluster],
                    means,
                    spread,
                }
            })
            .collect()
    }
}

/// Highest silhouette wins; on a tie the earlier (smaller k) fit is kept.
fn best_by_silhouette(fits: impl IntoIterator<Item = KMeansFit>) -> Option<KMeansFit> {
    fits.into_iter().fold(None, |best, fit| match best {
        Some(b) if fit.silhouette <= b.silhouette => Some(b),
        _ => Some(fit),
    })
}

fn count_distinct_rows(matrix: &Array2<f64>) -> usize {
    let mut rows: Vec<Vec<u64>> = matrix
        .outer_iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect())
        .collect();
    rows.sort_unstable();
    rows.dedup();
    rows.len()
}

/// Run the whole pipeline on raw rows: validate, extract, segment.
pub fn segment_transactions(
    rows: &[RawTransaction],
    config: &PipelineConfig,
) -> crate::Result<Segmentation> {
    let segmenter = Segmenter::new(config.clone())?;
    let vectors = FeatureExtractor::from_config(config).extract_raw(rows)?;
    segmenter.segment(&vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(id: &str, income: f64, spend: f64, discretionary: f64) -> CustomerFeatureVector {
        CustomerFeatureVector {
            customer_id: id.to_string(),
            months_observed: 6,
            avg_monthly_income: income,
            avg_monthly_spend: spend,
            avg_monthly_essential: spend - discretionary,
            avg_monthly_discretionary: discretionary,
            avg_monthly_fixed: 0.0,
            avg_monthly_investment: 0.0,
            avg_monthly_other: 0.0,
            savings_rate: if income > 0.0 { Some((income - spend) / income) } else { None },
            spend_volatility: Some(0.05),
            discretionary_ratio: discretionary / spend,
            transaction_count: 60,
            avg_monthly_transactions: 10.0,
            avg_transaction_size: spend / 10.0,
            income_trend: 0.0,
            spending_trend: 0.0,
        }
    }

    fn population() -> Vec<CustomerFeatureVector> {
        let mut vectors = Vec::new();
        for i in 0..4 {
            let jitter = i as f64 * 10.0;
            vectors.push(vector(&format!("S{i}"), 5000.0 + jitter, 2000.0, 400.0));
            vectors.push(vector(&format!("B{i}"), 3000.0 + jitter, 2900.0, 300.0));
            vectors.push(vector(&format!("L{i}"), 2500.0 + jitter, 2400.0, 1500.0));
        }
        vectors
    }

    #[test]
    fn test_insufficient_customers() {
        let segmenter = Segmenter::new(PipelineConfig::default()).unwrap();
        let vectors = vec![vector("A", 1.0, 1.0, 0.5), vector("B", 2.0, 1.0, 0.5)];

        let err = segmenter.segment(&vectors).unwrap_err();
        assert!(matches!(
            err,
            SegmentationError::InsufficientData { customers: 2, required: 3 }
        ));
    }

    #[test]
    fn test_identical_vectors_are_degenerate() {
        let segmenter = Segmenter::new(PipelineConfig::default()).unwrap();
        let vectors: Vec<_> = (0..6).map(|i| vector(&format!("C{i}"), 3000.0, 2000.0, 500.0)).collect();

        let err = segmenter.segment(&vectors).unwrap_err();
        assert!(matches!(err, SegmentationError::DegenerateInput));
    }

    #[test]
    fn test_too_few_distinct_vectors_for_fixed_k() {
        let config = PipelineConfig {
            fixed_clusters: Some(3),
            ..Default::default()
        };
        let segmenter = Segmenter::new(config).unwrap();
        let mut vectors: Vec<_> = (0..3).map(|i| vector(&format!("A{i}"), 3000.0, 2000.0, 500.0)).collect();
        vectors.extend((0..3).map(|i| vector(&format!("B{i}"), 6000.0, 2000.0, 500.0)));

        let err = segmenter.segment(&vectors).unwrap_err();
        assert!(matches!(
            err,
            SegmentationError::InsufficientData { customers: 2, required: 3 }
        ));
    }

    #[test]
    fn test_segment_assigns_every_customer() {
        let segmenter = Segmenter::new(PipelineConfig::default()).unwrap();
        let vectors = population();
        let result = segmenter.segment(&vectors).unwrap();

        assert_eq!(result.assignments.len(), vectors.len());
        assert_eq!(result.centroids.len(), result.model.n_clusters);
        let total: usize = result.centroids.iter().map(|c| c.size).sum();
        assert_eq!(total, vectors.len());

        for (assignment, vector) in result.assignments.iter().zip(&vectors) {
            assert_eq!(assignment.customer_id, vector.customer_id);
            assert!(assignment.cluster < result.model.n_clusters);
            assert!(assignment.distance.is_finite() && assignment.distance >= 0.0);
            assert_eq!(assignment.persona, result.centroids[assignment.cluster].persona);
        }

        // First customer always lands in cluster 0
        assert_eq!(result.assignments[0].cluster, 0);
    }

    #[test]
    fn test_segment_is_deterministic() {
        let segmenter = Segmenter::new(PipelineConfig::default()).unwrap();
        let vectors = population();

        let first = segmenter.segment(&vectors).unwrap();
        let second = segmenter.segment(&vectors).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_personas_follow_centroids() {
        let config = PipelineConfig {
            fixed_clusters: Some(3),
            ..Default::default()
        };
        let result = Segmenter::new(config).unwrap().segment(&population()).unwrap();

        let persona_of = |id: &str| result.assignment(id).unwrap().persona.clone();
        assert_eq!(persona_of("S0"), "Super Saver");
        assert_eq!(persona_of("B0"), "Budget Conscious");
        assert_eq!(persona_of("L0"), "Lifestyle Enthusiast");
        assert_ne!(result.assignment("S0").unwrap().cluster, result.assignment("B0").unwrap().cluster);
    }

    #[test]
    fn test_null_savings_rate_is_imputed() {
        let mut vectors = population();
        vectors.push(vector("Z0", 0.0, 800.0, 100.0));
        let result = Segmenter::new(PipelineConfig::default())
            .unwrap()
            .segment(&vectors)
            .unwrap();

        assert!(result.assignment("Z0").is_some());
        assert!(result.assignments.iter().all(|a| a.distance.is_finite()));
    }

    fn scored_fit(k: usize, silhouette: f64) -> KMeansFit {
        KMeansFit {
            n_clusters: k,
            labels: ndarray::Array1::from_iter((0..k).cycle().take(2 * k)),
            centroids: Array2::zeros((k, 2)),
            inertia: 1.0,
            silhouette,
        }
    }

    #[test]
    fn test_silhouette_tie_keeps_smaller_k() {
        let best = best_by_silhouette(vec![scored_fit(3, 0.62), scored_fit(4, 0.62), scored_fit(5, 0.4)]).unwrap();
        assert_eq!(best.n_clusters, 3);
    }

    #[test]
    fn test_higher_silhouette_wins_at_larger_k() {
        let best = best_by_silhouette(vec![scored_fit(3, 0.41), scored_fit(4, 0.58), scored_fit(5, 0.58)]).unwrap();
        assert_eq!(best.n_clusters, 4);

        assert!(best_by_silhouette(Vec::new()).is_none());
    }

    #[test]
    fn test_centroids_carry_member_spread() {
        let config = PipelineConfig {
            fixed_clusters: Some(3),
            ..Default::default()
        };
        let result = Segmenter::new(config).unwrap().segment(&population()).unwrap();

        let saver = &result.centroids[result.assignment("S0").unwrap().cluster];
        assert_eq!(saver.size, 4);
        let income = saver.spread(Feature::AvgMonthlyIncome).unwrap();
        assert_eq!(income.min, 5000.0);
        assert_eq!(income.max, 5030.0);
        // 5000, 5010, 5020, 5030
        assert!((income.std - 125.0f64.sqrt()).abs() < 1e-9);

        let spend = saver.spread(Feature::AvgMonthlySpend).unwrap();
        assert_eq!(spend.std, 0.0);
        assert_eq!(spend.min, spend.max);
    }

    #[test]
    fn test_count_distinct_rows() {
        let matrix = ndarray::array![[1.0, 2.0], [1.0, 2.0], [0.0, 2.0]];
        assert_eq!(count_distinct_rows(&matrix), 2);
    }
}

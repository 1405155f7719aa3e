//! Pipeline configuration loaded from JSON, every field defaulted

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SegmentationError;
use crate::features::AnalysisWindow;
use crate::persona::PersonaTable;
use crate::transaction::UnknownCategoryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed of the K-Means initialisation RNG
    pub seed: u64,
    /// Smallest cluster count tried when selecting k by silhouette score
    pub min_clusters: usize,
    /// Largest cluster count tried when selecting k by silhouette score
    pub max_clusters: usize,
    /// Skip selection and fit exactly this many clusters
    pub fixed_clusters: Option<usize>,
    pub max_iterations: u64,
    pub tolerance: f64,
    /// K-Means restarts per k; the lowest-inertia run is kept
    pub n_runs: usize,
    pub unknown_category: UnknownCategoryPolicy,
    pub window: AnalysisWindow,
    pub personas: PersonaTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            min_clusters: 3,
            max_clusters: 8,
            fixed_clusters: None,
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
            unknown_category: UnknownCategoryPolicy::default(),
            window: AnalysisWindow::default(),
            personas: PersonaTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file. Missing fields take
    /// their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if let Some(k) = self.fixed_clusters {
            if k < 2 {
                return Err(SegmentationError::Config(format!(
                    "fixed_clusters must be at least 2, got {}",
                    k
                )));
            }
        } else {
            if self.min_clusters < 2 {
                return Err(SegmentationError::Config(format!(
                    "min_clusters must be at least 2, got {}",
                    self.min_clusters
                )));
            }
            if self.max_clusters < self.min_clusters {
                return Err(SegmentationError::Config(format!(
                    "cluster range {}..={} is empty",
                    self.min_clusters, self.max_clusters
                )));
            }
        }

        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SegmentationError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(SegmentationError::Config("max_iterations must be positive".to_string()));
        }
        if self.n_runs == 0 {
            return Err(SegmentationError::Config("n_runs must be positive".to_string()));
        }
        if let (Some(start), Some(end)) = (self.window.start, self.window.end) {
            if start > end {
                return Err(SegmentationError::Config(format!(
                    "analysis window starts ({}) after it ends ({})",
                    start, end
                )));
            }
        }

        Ok(())
    }

    /// Minimum population size a run needs
    pub fn min_customers(&self) -> usize {
        self.fixed_clusters.unwrap_or(self.min_clusters)
    }

    /// Cluster counts to evaluate for a population of `n` customers, ascending
    pub fn cluster_candidates(&self, n: usize) -> Vec<usize> {
        match self.fixed_clusters {
            Some(k) => vec![k],
            None => (self.min_clusters..=self.max_clusters.min(n)).collect(),
        }
    }
}

//! Command-line interface definitions and argument parsing

use clap::Parser;
use std::path::PathBuf;

use crate::config::PipelineConfig;

/// Customer persona segmentation from transaction history using K-Means
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transactions CSV file
    #[arg(short, long, default_value = "transactions.csv")]
    pub input: PathBuf,

    /// JSON pipeline configuration; missing fields use defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Fit exactly this many clusters instead of selecting by silhouette score
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Seed for K-Means initialisation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write assignments and persona centroids as JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save the fitted model artifact as JSON to this path
    #[arg(long)]
    pub model_out: Option<PathBuf>,

    /// Prediction mode: score this customer from the input file against a saved model
    /// Example: --predict C042 --model model.json
    #[arg(short, long, requires = "model")]
    pub predict: Option<String>,

    /// Saved model artifact used by --predict
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the pipeline configuration: file first, then flag overrides.
    pub fn pipeline_config(&self) -> crate::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(k) = self.clusters {
            config.fixed_clusters = Some(k);
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides() {
        let args = Args::parse_from(["personaforge", "-i", "tx.csv", "-k", "4", "--seed", "7"]);
        let config = args.pipeline_config().unwrap();

        assert_eq!(args.input, PathBuf::from("tx.csv"));
        assert_eq!(config.fixed_clusters, Some(4));
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_iterations, 300);
    }

    #[test]
    fn test_invalid_cluster_override() {
        let args = Args::parse_from(["personaforge", "-k", "1"]);
        assert!(args.pipeline_config().is_err());
    }

    #[test]
    fn test_predict_requires_model() {
        assert!(Args::try_parse_from(["personaforge", "--predict", "C001"]).is_err());
        let args = Args::try_parse_from(["personaforge", "--predict", "C001", "--model", "m.json"]).unwrap();
        assert_eq!(args.predict.as_deref(), Some("C001"));
    }
}

//! PersonaForge: customer financial persona segmentation
//!
//! Turns raw transaction rows into per-customer monthly feature vectors,
//! clusters the standardized population with K-Means and labels each cluster
//! with a persona from an ordered rule table.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod model;
pub mod persona;
pub mod report;
pub mod scaler;
pub mod segmenter;
pub mod transaction;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::load_transactions;
pub use error::SegmentationError;
pub use features::{AnalysisWindow, CustomerFeatureVector, Feature, FeatureExtractor};
pub use model::{fit_kmeans, ClusterAssignment, KMeansFit, SegmentationModel};
pub use persona::{Comparison, Condition, FeatureSpread, PersonaCentroid, PersonaRule, PersonaTable};
pub use segmenter::{segment_transactions, Segmentation, Segmenter};
pub use transaction::{Category, RawTransaction, Transaction, TransactionType, UnknownCategoryPolicy};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentationError>;

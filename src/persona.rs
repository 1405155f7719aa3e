//! Persona labelling: an ordered rule table evaluated against cluster centroids

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::features::Feature;

pub const SUPER_SAVER: &str = "Super Saver";
pub const PRUDENT_PLANNER: &str = "Prudent Planner";
pub const HIGH_EARNER_SPENDER: &str = "High Earner Spender";
pub const LIFESTYLE_ENTHUSIAST: &str = "Lifestyle Enthusiast";
pub const BUDGET_CONSCIOUS: &str = "Budget Conscious";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
}

/// A strict threshold test on one centroid feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub feature: Feature,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl Condition {
    pub fn above(feature: Feature, threshold: f64) -> Self {
        Self {
            feature,
            comparison: Comparison::Above,
            threshold,
        }
    }

    pub fn below(feature: Feature, threshold: f64) -> Self {
        Self {
            feature,
            comparison: Comparison::Below,
            threshold,
        }
    }

    /// A missing value never satisfies a condition.
    pub fn holds(&self, value: Option<f64>) -> bool {
        match (value, self.comparison) {
            (Some(v), Comparison::Above) => v > self.threshold,
            (Some(v), Comparison::Below) => v < self.threshold,
            (None, _) => false,
        }
    }
}

/// A label and the conditions that must all hold for it to apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRule {
    pub label: String,
    pub conditions: Vec<Condition>,
}

impl PersonaRule {
    pub fn new(label: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            label: label.into(),
            conditions,
        }
    }

    pub fn matches(&self, value_of: impl Fn(Feature) -> Option<f64>) -> bool {
        self.conditions.iter().all(|c| c.holds(value_of(c.feature)))
    }
}

/// Rules in evaluation order; the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaTable {
    pub rules: Vec<PersonaRule>,
    pub default_label: String,
}

impl Default for PersonaTable {
    fn default() -> Self {
        Self {
            rules: vec![
                PersonaRule::new(SUPER_SAVER, vec![Condition::above(Feature::SavingsRate, 0.3)]),
                PersonaRule::new(
                    PRUDENT_PLANNER,
                    vec![
                        Condition::above(Feature::SavingsRate, 0.15),
                        Condition::below(Feature::DiscretionaryRatio, 0.3),
                    ],
                ),
                PersonaRule::new(
                    HIGH_EARNER_SPENDER,
                    vec![
                        Condition::above(Feature::AvgMonthlyIncome, 3000.0),
                        Condition::above(Feature::DiscretionaryRatio, 0.4),
                    ],
                ),
                PersonaRule::new(
                    LIFESTYLE_ENTHUSIAST,
                    vec![Condition::above(Feature::DiscretionaryRatio, 0.5)],
                ),
            ],
            default_label: BUDGET_CONSCIOUS.to_string(),
        }
    }
}

impl PersonaTable {
    pub fn assign(&self, value_of: impl Fn(Feature) -> Option<f64>) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(&value_of))
            .map_or(self.default_label.as_str(), |rule| rule.label.as_str())
    }
}

/// Per-cluster summary in original feature units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaCentroid {
    pub cluster: usize,
    pub persona: String,
    pub size: usize,
    /// Mean of each feature over the cluster's members; `None` when no
    /// member has a value for it
    pub means: BTreeMap<Feature, Option<f64>>,
    /// Spread of each feature over the same member values
    #[serde(default)]
    pub spread: BTreeMap<Feature, Option<FeatureSpread>>,
}

impl PersonaCentroid {
    pub fn mean(&self, feature: Feature) -> Option<f64> {
        self.means.get(&feature).copied().flatten()
    }

    pub fn spread(&self, feature: Feature) -> Option<FeatureSpread> {
        self.spread.get(&feature).copied().flatten()
    }
}

/// Population standard deviation and range of one feature within a cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpread {
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl FeatureSpread {
    /// `None` for an empty slice
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            std: variance.sqrt(),
            min,
            max,
        })
    }
}

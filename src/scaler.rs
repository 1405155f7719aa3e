//! Null-sentinel imputation and column standardization

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::SegmentationError;
use crate::features::{CustomerFeatureVector, Feature};

/// Relative tolerance under which a column counts as constant
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Fills `None` sentinels with the population median of the column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    /// Fill value per column, in [`Feature::ALL`] order
    pub fill: Vec<f64>,
}

impl Imputer {
    pub fn fit(vectors: &[CustomerFeatureVector]) -> Self {
        let fill = Feature::ALL
            .iter()
            .map(|&feature| {
                let mut present: Vec<f64> = vectors.iter().filter_map(|v| v.get(feature)).collect();
                let missing = vectors.len() - present.len();
                if missing > 0 {
                    log::warn!(
                        "{} of {} customers have no {}; imputing the population median",
                        missing,
                        vectors.len(),
                        feature.name()
                    );
                }
                median(&mut present).unwrap_or(0.0)
            })
            .collect();

        Self { fill }
    }

    pub fn row(&self, vector: &CustomerFeatureVector) -> Array1<f64> {
        Feature::ALL
            .iter()
            .map(|&feature| vector.get(feature).unwrap_or(self.fill[feature.index()]))
            .collect()
    }

    /// One row per customer, in input order
    pub fn matrix(&self, vectors: &[CustomerFeatureVector]) -> Array2<f64> {
        let mut matrix = Array2::zeros((vectors.len(), Feature::ALL.len()));
        for (mut out, vector) in matrix.rows_mut().into_iter().zip(vectors) {
            out.assign(&self.row(vector));
        }
        matrix
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Zero-mean, unit-variance scaling fitted on a population.
///
/// Constant columns keep a scale of zero and transform to 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Array1<f64>,
    pub scales: Array1<f64>,
}

impl Standardizer {
    pub fn fit(matrix: &Array2<f64>) -> Self {
        let means = matrix
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(matrix.ncols()));
        let mut scales = matrix.std_axis(Axis(0), 0.0);
        for (scale, mean) in scales.iter_mut().zip(means.iter()) {
            if *scale <= ZERO_VARIANCE_TOLERANCE * (1.0 + mean.abs()) {
                *scale = 0.0;
            }
        }
        Self { means, scales }
    }

    /// True when every column is constant
    pub fn is_degenerate(&self) -> bool {
        self.scales.iter().all(|&s| s == 0.0)
    }

    pub fn transform(&self, matrix: &Array2<f64>) -> Array2<f64> {
        let mut scaled = matrix.clone();
        for mut row in scaled.rows_mut() {
            let standardized = self.transform_row(row.view());
            row.assign(&standardized);
        }
        scaled
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Array1<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(&x, (&mean, &scale))| if scale == 0.0 { 0.0 } else { (x - mean) / scale })
            .collect()
    }

    /// Map a standardized row back to original units
    pub fn inverse_transform_row(&self, row: ArrayView1<f64>) -> Array1<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(&z, (&mean, &scale))| mean + z * scale)
            .collect()
    }
}

/// Fail on the first non-finite standardized value, naming customer and feature.
pub fn ensure_finite(matrix: &Array2<f64>, customer_ids: &[String]) -> crate::Result<()> {
    for (row, customer_id) in matrix.outer_iter().zip(customer_ids) {
        if let Some((col, value)) = row.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            let feature = Feature::ALL[col].name();
            log::error!("non-finite standardized value {value} for customer '{customer_id}' in {feature}: {row}");
            return Err(SegmentationError::computation(
                format!("standardization of customer '{}'", customer_id),
                format!("{} is {}", feature, value),
            ));
        }
    }
    Ok(())
}

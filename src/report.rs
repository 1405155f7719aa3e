//! Console summary of a segmentation run

use std::fmt;

use crate::features::Feature;
use crate::segmenter::Segmentation;

/// Features shown in the centroid table
const SUMMARY_FEATURES: [Feature; 4] = [
    Feature::AvgMonthlyIncome,
    Feature::AvgMonthlySpend,
    Feature::SavingsRate,
    Feature::DiscretionaryRatio,
];

/// Cluster statistics as a plain-text table
impl fmt::Display for Segmentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = &self.model;
        let total = self.assignments.len();

        writeln!(f, "=== Segmentation Summary ===")?;
        writeln!(f, "Number of clusters: {}", model.n_clusters)?;
        writeln!(f, "Total customers: {}", total)?;
        writeln!(f, "Silhouette score: {:.3}", model.silhouette)?;
        writeln!(f, "Within-cluster sum of squares (Inertia): {:.2}", model.inertia)?;

        writeln!(f, "\nPersonas:")?;
        for centroid in &self.centroids {
            let percentage = if total > 0 {
                centroid.size as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            writeln!(
                f,
                "  Cluster {}: {:<22} {} customers ({:.1}%)",
                centroid.cluster, centroid.persona, centroid.size, percentage
            )?;
        }

        writeln!(f, "\nCluster centroids (original units):")?;
        let header: Vec<String> = SUMMARY_FEATURES.iter().map(|feature| format!("{:>20}", feature.name())).collect();
        writeln!(f, "  Cluster |{}", header.join(" |"))?;
        for centroid in &self.centroids {
            let cells: Vec<String> = SUMMARY_FEATURES
                .iter()
                .map(|&feature| match centroid.mean(feature) {
                    Some(v) => format!("{:>20.3}", v),
                    None => format!("{:>20}", "n/a"),
                })
                .collect();
            writeln!(f, "  {:7} |{}", centroid.cluster, cells.join(" |"))?;
        }

        // Customers furthest from their centroid are the least certain assignments
        if let Some(weakest) = self
            .assignments
            .iter()
            .max_by(|a, b| a.distance.total_cmp(&b.distance))
        {
            writeln!(
                f,
                "\nWeakest assignment: customer {} in cluster {} (distance {:.3})",
                weakest.customer_id, weakest.cluster, weakest.distance
            )?;
        }

        Ok(())
    }
}

/// Render cluster statistics as a plain-text table
pub fn format_summary(segmentation: &Segmentation) -> String {
    segmentation.to_string()
}

/// Print cluster statistics to console
pub fn print_summary(segmentation: &Segmentation) {
    println!("\n{}", segmentation);
}

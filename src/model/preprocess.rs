//! Column-wise preprocessing: median imputation and standardization

use crate::dataset::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Replaces missing (`NaN`) cells with the column median seen at fit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    /// Columns with no observed value impute to 0.0
    pub fn fit(x: &FeatureMatrix) -> Self {
        let medians = (0..x.n_features())
            .map(|c| {
                let mut observed: Vec<f64> =
                    x.column(c).into_iter().filter(|v| v.is_finite()).collect();
                median(&mut observed).unwrap_or(0.0)
            })
            .collect();
        Self { medians }
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }

    pub fn transform(&self, x: &FeatureMatrix) -> FeatureMatrix {
        x.map_cells(|c, v| if v.is_finite() { v } else { self.medians[c] })
    }
}

/// Centers each column to zero mean and unit (population) variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Zero-variance columns keep a scale of 1.0
    pub fn fit(x: &FeatureMatrix) -> Self {
        let n = x.n_rows().max(1) as f64;
        let mut means = Vec::with_capacity(x.n_features());
        let mut scales = Vec::with_capacity(x.n_features());
        for c in 0..x.n_features() {
            let col = x.column(c);
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            means.push(mean);
            scales.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Self { means, scales }
    }

    pub fn transform(&self, x: &FeatureMatrix) -> FeatureMatrix {
        x.map_cells(|c, v| (v - self.means[c]) / self.scales[c])
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

//! Collection-level quality assessment over a sample of stored vectors.

use serde::{Deserialize, Serialize};

use crate::constants::DIMENSION;
use crate::vector::{cosine_similarity, l2_norm};

const NORMALIZATION_FLOOR: f64 = 95.0;
const CONSISTENCY_FLOOR: f64 = 80.0;
const COVERAGE_FLOOR: f64 = 70.0;
const ANOMALY_RATIO_CEILING: f64 = 0.1;
const IQR_FENCE: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 60.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub sample_size: usize,
    /// 100 · (1 − mean |1 − ‖v‖|)
    pub normalization: f64,
    /// 100 · mean pairwise cosine similarity
    pub consistency: f64,
    /// Every vector has exactly `DIMENSION` components.
    pub dimensionality: bool,
    /// min(100, 100 · mean per-dimension variance)
    pub coverage: f64,
    /// Magnitudes outside the 1.5·IQR fences.
    pub anomalies: usize,
    pub alerts: Vec<String>,
    pub grade: QualityGrade,
}

/// Score a sample of vectors. Returns `None` when there is nothing to score.
pub fn assess(vectors: &[Vec<f64>]) -> Option<QualityReport> {
    if vectors.is_empty() {
        return None;
    }
    let n = vectors.len() as f64;

    let norm_error: f64 = vectors.iter().map(|v| (1.0 - l2_norm(v)).abs()).sum::<f64>() / n;
    let normalization = 100.0 * (1.0 - norm_error);
    let consistency = consistency(vectors);
    let dimensionality = vectors.iter().all(|v| v.len() == DIMENSION);
    let coverage = coverage(vectors);
    let anomalies = count_anomalies(vectors);

    let mut alerts = Vec::new();
    if normalization < NORMALIZATION_FLOOR {
        alerts.push("vector normalization below threshold".to_string());
    }
    if consistency < CONSISTENCY_FLOOR {
        alerts.push("low pattern consistency detected".to_string());
    }
    if !dimensionality {
        alerts.push("inconsistent vector dimensions found".to_string());
    }
    if coverage < COVERAGE_FLOOR {
        alerts.push("low vector space coverage".to_string());
    }
    if anomalies as f64 > n * ANOMALY_RATIO_CEILING {
        alerts.push("high number of anomalous vectors detected".to_string());
    }

    let dim_score = if dimensionality { 100.0 } else { 0.0 };
    let score = (normalization + consistency + dim_score + coverage) / 4.0;

    Some(QualityReport {
        sample_size: vectors.len(),
        normalization,
        consistency,
        dimensionality,
        coverage,
        anomalies,
        alerts,
        grade: QualityGrade::from_score(score),
    })
}

fn consistency(vectors: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            total += cosine_similarity(&vectors[i], &vectors[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64 * 100.0
    }
}

fn coverage(vectors: &[Vec<f64>]) -> f64 {
    let dims = vectors.iter().map(Vec::len).min().unwrap_or(0);
    if dims == 0 {
        return 0.0;
    }
    let n = vectors.len() as f64;
    let total_variance: f64 = (0..dims)
        .map(|d| {
            let mean = vectors.iter().map(|v| v[d]).sum::<f64>() / n;
            vectors.iter().map(|v| (v[d] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    (total_variance / dims as f64 * 100.0).min(100.0)
}

fn count_anomalies(vectors: &[Vec<f64>]) -> usize {
    let magnitudes: Vec<f64> = vectors.iter().map(|v| l2_norm(v)).collect();
    let mut sorted = magnitudes.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = sorted[(sorted.len() as f64 * 0.25) as usize];
    let q3 = sorted[(sorted.len() as f64 * 0.75) as usize];
    let iqr = q3 - q1;
    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;
    magnitudes
        .iter()
        .filter(|&&m| m < lower || m > upper)
        .count()
}

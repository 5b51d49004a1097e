use serde::{Deserialize, Serialize};

use super::path::PathResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Weak,
    Fair,
    Good,
    Excellent,
}

impl std::fmt::Display for QualityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityBand::Weak => write!(f, "weak"),
            QualityBand::Fair => write!(f, "fair"),
            QualityBand::Good => write!(f, "good"),
            QualityBand::Excellent => write!(f, "excellent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathQuality {
    pub average_strength: f64,
    pub minimum_strength: f64,
    pub quality: QualityBand,
}

/// Band thresholds as (weakest link must exceed, average must reach).
const BANDS: [(QualityBand, f64, f64); 3] = [
    (QualityBand::Excellent, 0.8, 0.8),
    (QualityBand::Good, 0.6, 0.7),
    (QualityBand::Fair, 0.4, 0.5),
];

pub fn classify(average: f64, minimum: f64) -> QualityBand {
    BANDS
        .iter()
        .find(|(_, min_floor, avg_floor)| minimum > *min_floor && average >= *avg_floor)
        .map(|(band, _, _)| *band)
        .unwrap_or(QualityBand::Weak)
}

/// Summarize a path by its average and weakest edge.
pub fn analyze_path_quality(path: &PathResult) -> PathQuality {
    if path.strengths.is_empty() {
        return PathQuality {
            average_strength: 1.0,
            minimum_strength: 1.0,
            quality: QualityBand::Excellent,
        };
    }

    let sum: f64 = path.strengths.iter().sum();
    let average_strength = sum / path.strengths.len() as f64;
    let minimum_strength = path
        .strengths
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);

    PathQuality {
        average_strength,
        minimum_strength,
        quality: classify(average_strength, minimum_strength),
    }
}

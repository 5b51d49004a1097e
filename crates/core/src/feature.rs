//! Shared vocabulary for resource pressure and feature degradation.
//!
//! The registry that mutates these values lives in `pathweave-resource`;
//! the types sit here so errors and configuration can name them.

use serde::{Deserialize, Serialize};

/// Process-wide resource pressure, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

impl PressureLevel {
    pub const ALL: [PressureLevel; 4] = [
        PressureLevel::Normal,
        PressureLevel::Warning,
        PressureLevel::Critical,
        PressureLevel::Emergency,
    ];

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => PressureLevel::Normal,
            1 => PressureLevel::Warning,
            2 => PressureLevel::Critical,
            _ => PressureLevel::Emergency,
        }
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressureLevel::Normal => write!(f, "normal"),
            PressureLevel::Warning => write!(f, "warning"),
            PressureLevel::Critical => write!(f, "critical"),
            PressureLevel::Emergency => write!(f, "emergency"),
        }
    }
}

/// Closed set of features the registry can degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Shortest-path discovery. Core.
    PathDiscovery,
    /// Grant timeline planning. Core.
    TimelinePlanning,
    /// k-shortest paths, sponsor metrics, network statistics.
    AdvancedAnalytics,
    /// Landmark selection and distance-table recomputation.
    LandmarkMaintenance,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::PathDiscovery,
        Feature::TimelinePlanning,
        Feature::AdvancedAnalytics,
        Feature::LandmarkMaintenance,
    ];

    /// Core features are never disabled by pressure alone.
    pub fn is_core(self) -> bool {
        matches!(self, Feature::PathDiscovery | Feature::TimelinePlanning)
    }

    /// Dense index for array-backed storage.
    pub fn index(self) -> usize {
        match self {
            Feature::PathDiscovery => 0,
            Feature::TimelinePlanning => 1,
            Feature::AdvancedAnalytics => 2,
            Feature::LandmarkMaintenance => 3,
        }
    }

    /// The state pressure alone assigns to this feature at `level`.
    pub fn status_at(self, level: PressureLevel) -> FeatureStatus {
        use FeatureStatus::*;
        match (self, level) {
            (Feature::TimelinePlanning, _) => Enabled,
            (Feature::PathDiscovery, PressureLevel::Emergency) => Degraded,
            (Feature::PathDiscovery, _) => Enabled,
            (_, PressureLevel::Normal) => Enabled,
            (_, PressureLevel::Warning) => Degraded,
            (_, PressureLevel::Critical | PressureLevel::Emergency) => Disabled,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::PathDiscovery => write!(f, "path_discovery"),
            Feature::TimelinePlanning => write!(f, "timeline_planning"),
            Feature::AdvancedAnalytics => write!(f, "advanced_analytics"),
            Feature::LandmarkMaintenance => write!(f, "landmark_maintenance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Enabled = 0,
    /// Runs in a reduced mode.
    Degraded = 1,
    Disabled = 2,
}

impl FeatureStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => FeatureStatus::Enabled,
            1 => FeatureStatus::Degraded,
            _ => FeatureStatus::Disabled,
        }
    }

    pub fn is_available(self) -> bool {
        !matches!(self, FeatureStatus::Disabled)
    }
}

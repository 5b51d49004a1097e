//! Hysteretic pressure-level state machine and per-feature flags.
//!
//! Reads (`level`, `status`, `is_feature_enabled`) are single atomic loads so
//! workers can consult the registry before every attempt. Writes go through
//! `observe`, `force_override` and `clear_override`, which serialize on an
//! internal mutex.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pathweave_core::config::{ResourceConfig, Thresholds};
use pathweave_core::{Feature, FeatureStatus, PathweaveError, PressureLevel};
use serde::Serialize;
use tracing::{info, warn};

use crate::snapshot::ResourceSnapshot;

/// Level the registry moves to from `current` given the level the latest
/// snapshot classifies as.
///
/// Escalation is immediate. Once at Critical or above the level is held at
/// Critical while the observation stays at Warning or above.
pub fn next_level(current: PressureLevel, observed: PressureLevel) -> PressureLevel {
    if observed >= current {
        observed
    } else if current >= PressureLevel::Critical && observed >= PressureLevel::Warning {
        PressureLevel::Critical
    } else {
        observed
    }
}

/// Outcome of one `observe` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelTransition {
    pub from: PressureLevel,
    pub to: PressureLevel,
    /// Level the snapshot alone classifies as, before hysteresis.
    pub observed: PressureLevel,
    /// Features whose state changed: (feature, old, new).
    pub changed: Vec<(Feature, FeatureStatus, FeatureStatus)>,
}

impl LevelTransition {
    pub fn level_changed(&self) -> bool {
        self.from != self.to
    }

    pub fn escalated(&self) -> bool {
        self.to > self.from
    }
}

/// Externally visible state of one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureState {
    pub feature: Feature,
    pub state: FeatureStatus,
    pub last_transition: DateTime<Utc>,
    pub overridden: bool,
}

struct Meta {
    last_transition: [DateTime<Utc>; 4],
    overrides: [Option<FeatureStatus>; 4],
}

pub struct FeatureFlagRegistry {
    cpu: Thresholds,
    memory: Thresholds,
    level: AtomicU8,
    states: [AtomicU8; 4],
    meta: Mutex<Meta>,
}

impl FeatureFlagRegistry {
    pub fn new(config: &ResourceConfig) -> Self {
        let now = Utc::now();
        Self {
            cpu: config.cpu,
            memory: config.memory,
            level: AtomicU8::new(PressureLevel::Normal as u8),
            states: std::array::from_fn(|_| AtomicU8::new(FeatureStatus::Enabled as u8)),
            meta: Mutex::new(Meta {
                last_transition: [now; 4],
                overrides: [None; 4],
            }),
        }
    }

    /// Level a snapshot classifies as: the worse of CPU and memory.
    pub fn observed_level(&self, snapshot: &ResourceSnapshot) -> PressureLevel {
        self.cpu
            .classify(snapshot.cpu_percent)
            .max(self.memory.classify(snapshot.memory_percent))
    }

    /// Feed one snapshot through the state machine and recompute every
    /// feature's state.
    pub fn observe(&self, snapshot: &ResourceSnapshot) -> LevelTransition {
        let observed = self.observed_level(snapshot);
        let mut meta = self.meta.lock().unwrap_or_else(|e| e.into_inner());

        let from = self.level();
        let to = next_level(from, observed);
        self.level.store(to as u8, Ordering::Release);

        let changed = self.recompute(&mut meta, to, snapshot.timestamp);
        drop(meta);

        if from != to {
            if to > from {
                warn!(
                    %from, %to,
                    cpu = snapshot.cpu_percent,
                    memory = snapshot.memory_percent,
                    "pressure escalated"
                );
            } else {
                info!(%from, %to, "pressure relaxed");
            }
        }
        for (feature, old, new) in &changed {
            info!(%feature, ?old, ?new, level = %to, "feature state changed");
        }

        LevelTransition {
            from,
            to,
            observed,
            changed,
        }
    }

    fn recompute(
        &self,
        meta: &mut Meta,
        level: PressureLevel,
        at: DateTime<Utc>,
    ) -> Vec<(Feature, FeatureStatus, FeatureStatus)> {
        let mut changed = Vec::new();
        for feature in Feature::ALL {
            let i = feature.index();
            let new = meta.overrides[i].unwrap_or_else(|| feature.status_at(level));
            let old = FeatureStatus::from_u8(self.states[i].swap(new as u8, Ordering::AcqRel));
            if old != new {
                meta.last_transition[i] = at;
                changed.push((feature, old, new));
            }
        }
        changed
    }

    pub fn level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn status(&self, feature: Feature) -> FeatureStatus {
        FeatureStatus::from_u8(self.states[feature.index()].load(Ordering::Acquire))
    }

    /// True for Enabled and Degraded.
    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        self.status(feature).is_available()
    }

    /// Current status, or `FeatureDisabled` naming the level.
    pub fn check(&self, feature: Feature) -> Result<FeatureStatus, PathweaveError> {
        match self.status(feature) {
            FeatureStatus::Disabled => Err(PathweaveError::FeatureDisabled {
                feature,
                level: self.level(),
            }),
            status => Ok(status),
        }
    }

    /// Pin `feature` to `state` until `clear_override`.
    pub fn force_override(&self, feature: Feature, state: FeatureStatus) {
        let mut meta = self.meta.lock().unwrap_or_else(|e| e.into_inner());
        meta.overrides[feature.index()] = Some(state);
        let changed = self.recompute(&mut meta, self.level(), Utc::now());
        drop(meta);
        info!(%feature, ?state, changed = !changed.is_empty(), "feature override set");
    }

    pub fn clear_override(&self, feature: Feature) {
        let mut meta = self.meta.lock().unwrap_or_else(|e| e.into_inner());
        let had = meta.overrides[feature.index()].take().is_some();
        self.recompute(&mut meta, self.level(), Utc::now());
        drop(meta);
        if had {
            info!(%feature, "feature override cleared");
        }
    }

    pub fn feature_states(&self) -> Vec<FeatureState> {
        let meta = self.meta.lock().unwrap_or_else(|e| e.into_inner());
        Feature::ALL
            .iter()
            .map(|&feature| FeatureState {
                feature,
                state: self.status(feature),
                last_transition: meta.last_transition[feature.index()],
                overridden: meta.overrides[feature.index()].is_some(),
            })
            .collect()
    }
}

//! Resource sampling and feature degradation.
//!
//! The [`ResourceSampler`] turns probe readings into monotonically timestamped
//! [`ResourceSnapshot`]s; the [`FeatureFlagRegistry`] maps each snapshot to a
//! [`PressureLevel`](pathweave_core::PressureLevel) and a per-feature state;
//! the [`ComplianceLedger`] keeps counters and recent alerts for reporting.

pub mod compliance;
pub mod registry;
pub mod sampler;
pub mod snapshot;

pub use compliance::{Alert, ComplianceLedger, ComplianceReport, ViolationCounters};
pub use registry::{FeatureFlagRegistry, FeatureState, LevelTransition};
pub use sampler::{ResourceProbe, ResourceSampler, SampleError, ScriptedProbe, SystemProbe};
pub use snapshot::{ResourceReading, ResourceSnapshot, SnapshotHistory};

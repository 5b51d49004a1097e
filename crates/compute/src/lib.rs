pub mod algorithms;
pub mod metrics;
pub mod tenant;
pub mod timeline;

pub use algorithms::degree::DegreeInfo;
pub use algorithms::graph_stats::NetworkStatistics;
pub use algorithms::landmarks::LandmarkSummary;
pub use algorithms::path::{NotFoundReason, PathOutcome, PathResult, PathsOutcome};
pub use algorithms::quality::{PathQuality, QualityBand};
pub use metrics::{EngagementSignals, MetricsOutcome, SponsorMetrics, SponsorTier};
pub use tenant::{ReclaimReport, TenantGraph, TenantGraphs};
pub use timeline::{generate_grant_timeline, generate_grant_timeline_at, GrantTimeline, Milestone, ProjectKind, RiskLevel};

//! Backwards-planned grant timelines.
//!
//! Milestones sit at fixed offsets before the deadline. Only offsets that
//! fit inside the available lead time are kept.

use chrono::{DateTime, Duration, Utc};
use pathweave_core::PathweaveError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    #[default]
    Foundation,
    Corporate,
    Research,
    Federal,
}

impl ProjectKind {
    /// Lead time a typical application of this kind needs.
    pub fn minimum_lead_days(self) -> i64 {
        match self {
            ProjectKind::Foundation => 14,
            ProjectKind::Corporate => 10,
            ProjectKind::Research => 21,
            ProjectKind::Federal => 45,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 30 or more days out: strategy and research.
    Early,
    /// 7 to 29 days: development and review.
    Middle,
    /// Under 7 days: execution and submission.
    Late,
}

impl Phase {
    pub fn for_days(days: i64) -> Self {
        if days >= 30 {
            Phase::Early
        } else if days >= 7 {
            Phase::Middle
        } else {
            Phase::Late
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestonePriority {
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    pub date: DateTime<Utc>,
    pub days_before_deadline: i64,
    pub phase: Phase,
    pub tasks: Vec<String>,
    pub priority: MilestonePriority,
}

impl Milestone {
    pub fn is_critical(&self) -> bool {
        self.priority == MilestonePriority::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantTimeline {
    pub deadline: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub project_kind: ProjectKind,
    pub lead_days: i64,
    /// Earliest first.
    pub milestones: Vec<Milestone>,
    /// Titles of the critical milestones, in date order.
    pub critical_path: Vec<String>,
    /// Lead days beyond the kind's minimum; negative when short.
    pub buffer_days: i64,
    pub risk_assessment: RiskLevel,
}

struct Template {
    days: i64,
    title: &'static str,
    tasks: &'static [&'static str],
    critical: bool,
}

const TEMPLATES: [Template; 7] = [
    Template {
        days: 90,
        title: "Strategy and sponsor research",
        tasks: &["Confirm eligibility", "Map warm introductions", "Outline project aims"],
        critical: false,
    },
    Template {
        days: 60,
        title: "Letter of intent",
        tasks: &["Draft letter of intent", "Line up partner commitments"],
        critical: false,
    },
    Template {
        days: 30,
        title: "Full proposal draft",
        tasks: &["Write narrative", "Draft budget", "Request letters of support"],
        critical: true,
    },
    Template {
        days: 14,
        title: "Internal review",
        tasks: &["Peer review narrative", "Reconcile budget with aims"],
        critical: false,
    },
    Template {
        days: 7,
        title: "Final revisions and approvals",
        tasks: &["Incorporate review feedback", "Obtain institutional sign-off"],
        critical: true,
    },
    Template {
        days: 3,
        title: "Package assembly",
        tasks: &["Assemble attachments", "Check formatting requirements"],
        critical: false,
    },
    Template {
        days: 1,
        title: "Submission",
        tasks: &["Submit application", "Archive confirmation receipt"],
        critical: true,
    },
];

fn assess_risk(lead_days: i64, buffer_days: i64) -> RiskLevel {
    if buffer_days < 0 {
        RiskLevel::Critical
    } else if lead_days < 30 {
        RiskLevel::High
    } else if lead_days < 60 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn generate_grant_timeline(
    deadline: DateTime<Utc>,
    kind: ProjectKind,
) -> Result<GrantTimeline, PathweaveError> {
    generate_grant_timeline_at(deadline, kind, Utc::now())
}

/// Plan backwards from `deadline` as seen from `now`.
pub fn generate_grant_timeline_at(
    deadline: DateTime<Utc>,
    kind: ProjectKind,
    now: DateTime<Utc>,
) -> Result<GrantTimeline, PathweaveError> {
    if deadline <= now {
        return Err(PathweaveError::validation(format!(
            "deadline {} is not in the future",
            deadline.to_rfc3339()
        )));
    }

    let lead_days = (deadline - now).num_days();
    let milestones: Vec<Milestone> = TEMPLATES
        .iter()
        .filter(|t| t.days <= lead_days)
        .map(|t| {
            let phase = Phase::for_days(t.days);
            let priority = if t.critical {
                MilestonePriority::Critical
            } else if phase == Phase::Early {
                MilestonePriority::Normal
            } else {
                MilestonePriority::High
            };
            Milestone {
                title: t.title.to_string(),
                date: deadline - Duration::days(t.days),
                days_before_deadline: t.days,
                phase,
                tasks: t.tasks.iter().map(|s| s.to_string()).collect(),
                priority,
            }
        })
        .collect();

    let critical_path = milestones
        .iter()
        .filter(|m| m.is_critical())
        .map(|m| m.title.clone())
        .collect();
    let buffer_days = lead_days - kind.minimum_lead_days();

    Ok(GrantTimeline {
        deadline,
        generated_at: now,
        project_kind: kind,
        lead_days,
        milestones,
        critical_path,
        buffer_days,
        risk_assessment: assess_risk(lead_days, buffer_days),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(days: i64, kind: ProjectKind) -> GrantTimeline {
        let now = Utc::now();
        generate_grant_timeline_at(now + Duration::days(days), kind, now).unwrap()
    }

    #[test]
    fn short_lead_is_high_risk() {
        let t = plan(20, ProjectKind::Foundation);
        assert_eq!(t.risk_assessment, RiskLevel::High);
        let offsets: Vec<i64> = t.milestones.iter().map(|m| m.days_before_deadline).collect();
        assert_eq!(offsets, vec![14, 7, 3, 1]);
        assert_eq!(t.buffer_days, 6);
    }

    #[test]
    fn milestones_never_pass_deadline() {
        for days in [1, 5, 45, 120] {
            let t = plan(days, ProjectKind::Research);
            assert!(t.milestones.iter().all(|m| m.date <= t.deadline));
            assert!(t.milestones.windows(2).all(|w| w[0].date <= w[1].date));
        }
    }

    #[test]
    fn full_plan_has_every_phase() {
        let t = plan(120, ProjectKind::Foundation);
        assert_eq!(t.milestones.len(), 7);
        assert_eq!(t.risk_assessment, RiskLevel::Low);
        assert_eq!(t.milestones[0].phase, Phase::Early);
        assert_eq!(t.milestones[3].phase, Phase::Middle);
        assert_eq!(t.milestones[6].phase, Phase::Late);
        assert_eq!(
            t.critical_path,
            vec!["Full proposal draft", "Final revisions and approvals", "Submission"]
        );
    }

    #[test]
    fn medium_risk_band() {
        assert_eq!(plan(45, ProjectKind::Foundation).risk_assessment, RiskLevel::Medium);
    }

    #[test]
    fn negative_buffer_is_critical() {
        let t = plan(40, ProjectKind::Federal);
        assert_eq!(t.buffer_days, -5);
        assert_eq!(t.risk_assessment, RiskLevel::Critical);
    }

    #[test]
    fn past_deadline_is_rejected() {
        let now = Utc::now();
        let err = generate_grant_timeline_at(now, ProjectKind::Corporate, now).unwrap_err();
        assert!(matches!(err, PathweaveError::Validation(_)));
        assert!(generate_grant_timeline_at(now - Duration::days(1), ProjectKind::Corporate, now).is_err());
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(Phase::for_days(30), Phase::Early);
        assert_eq!(Phase::for_days(29), Phase::Middle);
        assert_eq!(Phase::for_days(7), Phase::Middle);
        assert_eq!(Phase::for_days(6), Phase::Late);
    }
}

//! Counters and a bounded alert log backing the compliance report.
//!
//! Alerts are capped (default 50) with FIFO eviction.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pathweave_core::PressureLevel;
use serde::Serialize;

use crate::registry::LevelTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Escalated,
    Relaxed,
    SamplingFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub level: PressureLevel,
    pub message: String,
}

/// Samples observed at each non-normal level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViolationCounters {
    pub warning: u64,
    pub critical: u64,
    pub emergency: u64,
}

impl ViolationCounters {
    fn bump(&mut self, level: PressureLevel) {
        match level {
            PressureLevel::Normal => {}
            PressureLevel::Warning => self.warning += 1,
            PressureLevel::Critical => self.critical += 1,
            PressureLevel::Emergency => self.emergency += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.warning + self.critical + self.emergency
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub current_level: PressureLevel,
    pub violations: ViolationCounters,
    pub samples_observed: u64,
    pub drained_tasks: u64,
    pub cancelled_tasks: u64,
    pub sampling_failures: u64,
    /// Newest first.
    pub recent_alerts: Vec<Alert>,
    pub recommendations: Vec<String>,
}

#[derive(Default)]
struct LedgerState {
    violations: ViolationCounters,
    samples_observed: u64,
    drained_tasks: u64,
    cancelled_tasks: u64,
    sampling_failures: u64,
    alerts: VecDeque<Alert>,
}

pub struct ComplianceLedger {
    state: Mutex<LedgerState>,
    alert_capacity: usize,
}

impl ComplianceLedger {
    pub fn new(alert_capacity: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            alert_capacity: alert_capacity.max(1),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn push_alert(&self, state: &mut LedgerState, alert: Alert) {
        state.alerts.push_back(alert);
        while state.alerts.len() > self.alert_capacity {
            state.alerts.pop_front();
        }
    }

    /// Count one sample at the level the registry settled on.
    pub fn record_sample(&self, level: PressureLevel) {
        self.with_state(|s| {
            s.samples_observed += 1;
            s.violations.bump(level);
        });
    }

    /// Raise an alert when the level changed.
    pub fn record_transition(&self, transition: &LevelTransition, at: DateTime<Utc>) {
        if !transition.level_changed() {
            return;
        }
        let (kind, verb) = if transition.escalated() {
            (AlertKind::Escalated, "escalated")
        } else {
            (AlertKind::Relaxed, "relaxed")
        };
        let mut message = format!("pressure {} from {} to {}", verb, transition.from, transition.to);
        if !transition.changed.is_empty() {
            let features: Vec<String> = transition
                .changed
                .iter()
                .map(|(f, _, new)| format!("{}={:?}", f, new).to_lowercase())
                .collect();
            message.push_str(&format!(" ({})", features.join(", ")));
        }
        let alert = Alert {
            timestamp: at,
            kind,
            level: transition.to,
            message,
        };
        self.with_state(|s| self.push_alert(s, alert));
    }

    pub fn record_drained(&self, count: usize) {
        self.with_state(|s| s.drained_tasks += count as u64);
    }

    pub fn record_cancelled(&self, count: usize) {
        self.with_state(|s| s.cancelled_tasks += count as u64);
    }

    pub fn record_sampling_failure(&self, level: PressureLevel, error: &str) {
        let alert = Alert {
            timestamp: Utc::now(),
            kind: AlertKind::SamplingFailure,
            level,
            message: format!("resource sampling failed: {}", error),
        };
        self.with_state(|s| {
            s.sampling_failures += 1;
            self.push_alert(s, alert);
        });
    }

    pub fn report(&self, current_level: PressureLevel) -> ComplianceReport {
        self.with_state(|s| {
            let recent_alerts: Vec<Alert> = s.alerts.iter().rev().cloned().collect();
            ComplianceReport {
                generated_at: Utc::now(),
                current_level,
                violations: s.violations,
                samples_observed: s.samples_observed,
                drained_tasks: s.drained_tasks,
                cancelled_tasks: s.cancelled_tasks,
                sampling_failures: s.sampling_failures,
                recommendations: recommendations(s, current_level),
                recent_alerts,
            }
        })
    }
}

fn recommendations(s: &LedgerState, current: PressureLevel) -> Vec<String> {
    let mut out = Vec::new();

    if s.samples_observed == 0 {
        out.push("No resource samples observed yet; check that the sampler is running".to_string());
    }
    if s.violations.emergency > 0 {
        out.push(format!(
            "Emergency pressure seen in {} samples: lower worker_count or add memory headroom",
            s.violations.emergency
        ));
    }
    if s.violations.critical > 0 {
        out.push(format!(
            "Critical pressure seen in {} samples: schedule advanced analytics off-peak",
            s.violations.critical
        ));
    }
    if s.drained_tasks > 0 {
        out.push(format!(
            "{} queued tasks were drained under pressure; resubmit them once the level returns to normal",
            s.drained_tasks
        ));
    }
    if s.sampling_failures > 0 {
        out.push(format!(
            "Resource probe failed {} times; verify the process can read system statistics",
            s.sampling_failures
        ));
    }
    if current > PressureLevel::Normal {
        out.push(format!("Currently at {} pressure; expect degraded features", current));
    }
    if out.is_empty() {
        out.push("Resource usage within thresholds".to_string());
    }
    out
}

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw percentages reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl ResourceReading {
    pub fn new(cpu_percent: f64, memory_percent: f64, disk_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            disk_percent,
        }
    }

    /// Reading with only memory pressure, useful for scripted scenarios.
    pub fn memory(memory_percent: f64) -> Self {
        Self::new(0.0, memory_percent, 0.0)
    }

    fn clamped(self) -> Self {
        let c = |v: f64| if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 };
        Self {
            cpu_percent: c(self.cpu_percent),
            memory_percent: c(self.memory_percent),
            disk_percent: c(self.disk_percent),
        }
    }
}

/// Point-in-time resource reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded ring buffer of snapshots with non-decreasing timestamps.
#[derive(Debug)]
pub struct SnapshotHistory {
    buf: VecDeque<ResourceSnapshot>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a reading taken at `at`. If the wall clock stepped backwards
    /// the previous timestamp is reused so the series stays monotonic.
    pub fn push(&mut self, reading: ResourceReading, at: DateTime<Utc>) -> ResourceSnapshot {
        let timestamp = match self.buf.back() {
            Some(prev) if prev.timestamp > at => prev.timestamp,
            _ => at,
        };
        let r = reading.clamped();
        let snapshot = ResourceSnapshot {
            cpu_percent: r.cpu_percent,
            memory_percent: r.memory_percent,
            disk_percent: r.disk_percent,
            timestamp,
        };
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(snapshot);
        snapshot
    }

    pub fn latest(&self) -> Option<ResourceSnapshot> {
        self.buf.back().copied()
    }

    pub fn to_vec(&self) -> Vec<ResourceSnapshot> {
        self.buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut h = SnapshotHistory::new(2);
        let t0 = Utc::now();
        h.push(ResourceReading::memory(10.0), t0);
        h.push(ResourceReading::memory(20.0), t0 + Duration::seconds(1));
        h.push(ResourceReading::memory(30.0), t0 + Duration::seconds(2));

        let all = h.to_vec();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].memory_percent, 20.0);
        assert_eq!(h.latest().unwrap().memory_percent, 30.0);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut h = SnapshotHistory::new(4);
        let t0 = Utc::now();
        h.push(ResourceReading::memory(10.0), t0);
        let s = h.push(ResourceReading::memory(11.0), t0 - Duration::seconds(30));
        assert_eq!(s.timestamp, t0);
    }

    #[test]
    fn readings_are_clamped() {
        let mut h = SnapshotHistory::new(1);
        let s = h.push(ResourceReading::new(140.0, f64::NAN, -3.0), Utc::now());
        assert_eq!(s.cpu_percent, 100.0);
        assert_eq!(s.memory_percent, 0.0);
        assert_eq!(s.disk_percent, 0.0);
    }
}

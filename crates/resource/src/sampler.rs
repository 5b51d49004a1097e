use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use pathweave_core::config::ResourceConfig;
use sysinfo::{Disks, System};
use tracing::{debug, warn};

use crate::snapshot::{ResourceReading, ResourceSnapshot, SnapshotHistory};

/// Backoff after repeated probe failures never exceeds this multiple of the
/// sampling interval.
const MAX_BACKOFF_MULTIPLIER: u32 = 8;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SampleError {
    #[error("probe failed: {0}")]
    Probe(String),
}

/// Source of raw CPU/memory/disk percentages.
pub trait ResourceProbe: Send {
    fn sample(&mut self) -> Result<ResourceReading, SampleError>;
}

// ── SystemProbe ─────────────────────────────────────────────────────

/// Live probe backed by `sysinfo`.
pub struct SystemProbe {
    system: System,
    disks: Disks,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
        }
    }

    fn disk_percent(&self) -> f64 {
        let primary = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point().to_string_lossy() == "/")
            .or_else(|| self.disks.list().first());

        match primary {
            Some(disk) if disk.total_space() > 0 => {
                let total = disk.total_space();
                let used = total.saturating_sub(disk.available_space());
                used as f64 / total as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&mut self) -> Result<ResourceReading, SampleError> {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(SampleError::Probe("total memory reported as zero".into()));
        }
        let memory_percent = self.system.used_memory() as f64 / total as f64 * 100.0;
        let cpu_percent = self.system.global_cpu_info().cpu_usage() as f64;

        Ok(ResourceReading::new(cpu_percent, memory_percent, self.disk_percent()))
    }
}

// ── ScriptedProbe ───────────────────────────────────────────────────

/// Replays a fixed sequence of readings, then repeats the last successful one.
pub struct ScriptedProbe {
    script: VecDeque<Result<ResourceReading, String>>,
    last: Option<ResourceReading>,
}

impl ScriptedProbe {
    pub fn new(readings: impl IntoIterator<Item = ResourceReading>) -> Self {
        Self {
            script: readings.into_iter().map(Ok).collect(),
            last: None,
        }
    }

    /// Queue a failure at the end of the script.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    pub fn then(mut self, reading: ResourceReading) -> Self {
        self.script.push_back(Ok(reading));
        self
    }
}

impl ResourceProbe for ScriptedProbe {
    fn sample(&mut self) -> Result<ResourceReading, SampleError> {
        match self.script.pop_front() {
            Some(Ok(reading)) => {
                self.last = Some(reading);
                Ok(reading)
            }
            Some(Err(msg)) => Err(SampleError::Probe(msg)),
            None => self
                .last
                .ok_or_else(|| SampleError::Probe("script exhausted".into())),
        }
    }
}

// ── ResourceSampler ─────────────────────────────────────────────────

/// Polls a [`ResourceProbe`] and keeps a bounded history of snapshots.
///
/// The sampler itself is passive; the orchestrator drives it from a ticker.
pub struct ResourceSampler {
    probe: Mutex<Box<dyn ResourceProbe>>,
    history: RwLock<SnapshotHistory>,
    interval: Duration,
    consecutive_failures: AtomicU32,
}

impl ResourceSampler {
    pub fn new(probe: Box<dyn ResourceProbe>, config: &ResourceConfig) -> Self {
        Self {
            probe: Mutex::new(probe),
            history: RwLock::new(SnapshotHistory::new(config.history_capacity)),
            interval: config.sampling_interval(),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Take one reading and append it to the history.
    pub fn sample(&self) -> Result<ResourceSnapshot, SampleError> {
        let reading = {
            let mut probe = self.probe.lock().unwrap_or_else(|e| e.into_inner());
            probe.sample()
        };

        match reading {
            Ok(reading) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
                let snapshot = history.push(reading, Utc::now());
                debug!(
                    cpu = snapshot.cpu_percent,
                    memory = snapshot.memory_percent,
                    disk = snapshot.disk_percent,
                    "resource sample"
                );
                Ok(snapshot)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, failures, "resource sampling failed");
                Err(e)
            }
        }
    }

    pub fn latest(&self) -> Option<ResourceSnapshot> {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .latest()
    }

    pub fn history(&self) -> Vec<ResourceSnapshot> {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .to_vec()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay before the next tick: the base interval, doubled per consecutive
    /// failure and capped.
    pub fn next_delay(&self) -> Duration {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures == 0 {
            return self.interval;
        }
        let multiplier = 1u32
            .checked_shl(failures.min(16))
            .unwrap_or(u32::MAX)
            .min(MAX_BACKOFF_MULTIPLIER);
        self.interval * multiplier
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

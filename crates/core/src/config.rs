use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PathweaveError;
use crate::feature::PressureLevel;

/// Load `.env` into the process environment. Returns the file that was
/// read; a missing file is not an error.
pub fn load_env_file() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable .env file");
            None
        }
    }
}

/// Environment lookups for one profile: `{PROFILE}_{KEY}` shadows `{KEY}`.
struct EnvOverrides<'a> {
    profile: &'a str,
}

impl EnvOverrides<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        let read = |k: &str| env::var(k).ok().filter(|v| !v.trim().is_empty());
        if !self.profile.is_empty() {
            if let Some(v) = read(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        read(key)
    }

    /// Overwrite `target` when `key` is set and parses.
    fn apply<T: FromStr>(&self, key: &str, target: &mut T) {
        if let Some(raw) = self.lookup(key) {
            match raw.trim().parse() {
                Ok(v) => *target = v,
                Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable config override"),
            }
        }
    }
}

// ── Config ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Build config from defaults plus environment variables (call
    /// `load_env_file()` first). Profile is read from `PATHWEAVE_PROFILE`.
    /// When set (e.g. `PROD`), every key is first looked up as
    /// `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, PathweaveError> {
        let profile = env::var("PATHWEAVE_PROFILE").unwrap_or_default().to_uppercase();
        let mut config = Self {
            profile,
            ..Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string, then apply env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, PathweaveError> {
        let mut config: Self =
            toml::from_str(toml_str).map_err(|e| PathweaveError::Config(e.to_string()))?;
        config.profile = config.profile.to_uppercase();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PathweaveError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PathweaveError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&content)
    }

    fn apply_env_overrides(&mut self) {
        let env = EnvOverrides {
            profile: &self.profile,
        };
        self.resource.apply_env_overrides(&env);
        self.graph.apply_env_overrides(&env);
        self.orchestrator.apply_env_overrides(&env);
    }

    pub fn validate(&self) -> Result<(), PathweaveError> {
        self.resource.cpu.validate("cpu")?;
        self.resource.memory.validate("memory")?;
        if self.resource.sampling_interval_ms == 0 {
            return Err(PathweaveError::Config("sampling_interval_ms must be > 0".into()));
        }
        if self.resource.history_capacity == 0 {
            return Err(PathweaveError::Config("history_capacity must be > 0".into()));
        }
        self.graph.validate()?;
        self.orchestrator.validate()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let r = &self.resource;
        let g = &self.graph;
        let o = &self.orchestrator;
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  resource:     cpu={}/{}/{} memory={}/{}/{} interval={}ms",
            r.cpu.warning, r.cpu.critical, r.cpu.emergency,
            r.memory.warning, r.memory.critical, r.memory.emergency,
            r.sampling_interval_ms
        );
        tracing::info!(
            "  graph:        max_degree={} landmarks={}..{} (ratio {}) every {} nodes",
            g.max_path_degree, g.min_landmarks, g.max_landmarks, g.landmark_ratio, g.landmark_interval
        );
        tracing::info!(
            "  orchestrator: workers={} max_retries={} handler_timeout={}ms retain={}",
            o.worker_count, o.max_retries, o.handler_timeout_ms, o.finished_task_retention
        );
    }
}

// ── Resource thresholds ───────────────────────────────────────

/// Ascending percentage thresholds for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Thresholds {
    pub const fn new(warning: f64, critical: f64, emergency: f64) -> Self {
        Self { warning, critical, emergency }
    }

    /// Classify a percentage reading.
    pub fn classify(&self, percent: f64) -> PressureLevel {
        if percent >= self.emergency {
            PressureLevel::Emergency
        } else if percent >= self.critical {
            PressureLevel::Critical
        } else if percent >= self.warning {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }

    fn validate(&self, name: &str) -> Result<(), PathweaveError> {
        let ascending = self.warning < self.critical && self.critical < self.emergency;
        let in_range = self.warning > 0.0 && self.emergency <= 100.0;
        if !ascending || !in_range {
            return Err(PathweaveError::Config(format!(
                "{} thresholds must ascend within (0, 100]: {}/{}/{}",
                name, self.warning, self.critical, self.emergency
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_cpu_thresholds")]
    pub cpu: Thresholds,
    #[serde(default = "default_memory_thresholds")]
    pub memory: Thresholds,
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    /// Snapshots retained in the ring buffer.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Alerts retained for the compliance report.
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,
}

fn default_cpu_thresholds() -> Thresholds { Thresholds::new(75.0, 85.0, 95.0) }
fn default_memory_thresholds() -> Thresholds { Thresholds::new(75.0, 90.0, 95.0) }
fn default_sampling_interval_ms() -> u64 { 5_000 }
fn default_history_capacity() -> usize { 120 }
fn default_alert_capacity() -> usize { 50 }

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu_thresholds(),
            memory: default_memory_thresholds(),
            sampling_interval_ms: default_sampling_interval_ms(),
            history_capacity: default_history_capacity(),
            alert_capacity: default_alert_capacity(),
        }
    }
}

impl ResourceConfig {
    fn apply_env_overrides(&mut self, env: &EnvOverrides<'_>) {
        env.apply("CPU_WARNING_PERCENT", &mut self.cpu.warning);
        env.apply("CPU_CRITICAL_PERCENT", &mut self.cpu.critical);
        env.apply("CPU_EMERGENCY_PERCENT", &mut self.cpu.emergency);
        env.apply("MEMORY_WARNING_PERCENT", &mut self.memory.warning);
        env.apply("MEMORY_CRITICAL_PERCENT", &mut self.memory.critical);
        env.apply("MEMORY_EMERGENCY_PERCENT", &mut self.memory.emergency);
        env.apply("SAMPLING_INTERVAL_MS", &mut self.sampling_interval_ms);
        env.apply("SNAPSHOT_HISTORY", &mut self.history_capacity);
        env.apply("ALERT_CAPACITY", &mut self.alert_capacity);
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }
}

// ── Graph ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_max_path_degree")]
    pub max_path_degree: usize,
    /// Hop cap applied while path discovery is degraded.
    #[serde(default = "default_degraded_max_degree")]
    pub degraded_max_degree: usize,
    /// k cap applied while advanced analytics are degraded.
    #[serde(default = "default_degraded_k_cap")]
    pub degraded_k_cap: usize,
    #[serde(default = "default_landmark_ratio")]
    pub landmark_ratio: f64,
    #[serde(default = "default_min_landmarks")]
    pub min_landmarks: usize,
    #[serde(default = "default_max_landmarks")]
    pub max_landmarks: usize,
    /// Landmarks are recomputed whenever the node count reaches a multiple of this.
    #[serde(default = "default_landmark_interval")]
    pub landmark_interval: usize,
    /// Reverse-edge strength multiplier.
    #[serde(default = "default_asymmetry_factor")]
    pub asymmetry_factor: f64,
    /// Per-hop confidence decay.
    #[serde(default = "default_confidence_decay")]
    pub confidence_decay: f64,
}

fn default_max_path_degree() -> usize { 7 }
fn default_degraded_max_degree() -> usize { 4 }
fn default_degraded_k_cap() -> usize { 3 }
fn default_landmark_ratio() -> f64 { 0.05 }
fn default_min_landmarks() -> usize { 2 }
fn default_max_landmarks() -> usize { 32 }
fn default_landmark_interval() -> usize { 100 }
fn default_asymmetry_factor() -> f64 { 0.8 }
fn default_confidence_decay() -> f64 { 0.9 }

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_path_degree: default_max_path_degree(),
            degraded_max_degree: default_degraded_max_degree(),
            degraded_k_cap: default_degraded_k_cap(),
            landmark_ratio: default_landmark_ratio(),
            min_landmarks: default_min_landmarks(),
            max_landmarks: default_max_landmarks(),
            landmark_interval: default_landmark_interval(),
            asymmetry_factor: default_asymmetry_factor(),
            confidence_decay: default_confidence_decay(),
        }
    }
}

impl GraphConfig {
    fn apply_env_overrides(&mut self, env: &EnvOverrides<'_>) {
        env.apply("MAX_PATH_DEGREE", &mut self.max_path_degree);
        env.apply("DEGRADED_MAX_DEGREE", &mut self.degraded_max_degree);
        env.apply("DEGRADED_K_CAP", &mut self.degraded_k_cap);
        env.apply("LANDMARK_RATIO", &mut self.landmark_ratio);
        env.apply("MIN_LANDMARKS", &mut self.min_landmarks);
        env.apply("MAX_LANDMARKS", &mut self.max_landmarks);
        env.apply("LANDMARK_INTERVAL", &mut self.landmark_interval);
        env.apply("ASYMMETRY_FACTOR", &mut self.asymmetry_factor);
        env.apply("CONFIDENCE_DECAY", &mut self.confidence_decay);
    }

    fn validate(&self) -> Result<(), PathweaveError> {
        if self.max_path_degree == 0 {
            return Err(PathweaveError::Config("max_path_degree must be > 0".into()));
        }
        if !(self.landmark_ratio > 0.0 && self.landmark_ratio <= 1.0) {
            return Err(PathweaveError::Config(format!(
                "landmark_ratio must be in (0, 1], got {}",
                self.landmark_ratio
            )));
        }
        if self.min_landmarks > self.max_landmarks {
            return Err(PathweaveError::Config(format!(
                "min_landmarks ({}) exceeds max_landmarks ({})",
                self.min_landmarks, self.max_landmarks
            )));
        }
        if self.landmark_interval == 0 {
            return Err(PathweaveError::Config("landmark_interval must be > 0".into()));
        }
        if !(self.asymmetry_factor > 0.0 && self.asymmetry_factor < 1.0) {
            return Err(PathweaveError::Config("asymmetry_factor must be in (0, 1)".into()));
        }
        if !(self.confidence_decay > 0.0 && self.confidence_decay < 1.0) {
            return Err(PathweaveError::Config("confidence_decay must be in (0, 1)".into()));
        }
        Ok(())
    }
}

// ── Orchestrator ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Delay before a task with unmet dependencies is offered again.
    #[serde(default = "default_dependency_retry_ms")]
    pub dependency_retry_ms: u64,
    /// Upper bound on how long an idle worker waits before re-checking the queue.
    #[serde(default = "default_dequeue_wait_ms")]
    pub dequeue_wait_ms: u64,
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    /// Finished task records kept for status queries; the oldest go first.
    #[serde(default = "default_finished_task_retention")]
    pub finished_task_retention: usize,
}

fn default_worker_count() -> usize { 4 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_ms() -> u64 { 250 }
fn default_retry_max_ms() -> u64 { 10_000 }
fn default_dependency_retry_ms() -> u64 { 50 }
fn default_dequeue_wait_ms() -> u64 { 250 }
fn default_handler_timeout_ms() -> u64 { 30_000 }
fn default_finished_task_retention() -> usize { 10_000 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            dependency_retry_ms: default_dependency_retry_ms(),
            dequeue_wait_ms: default_dequeue_wait_ms(),
            handler_timeout_ms: default_handler_timeout_ms(),
            finished_task_retention: default_finished_task_retention(),
        }
    }
}

impl OrchestratorConfig {
    fn apply_env_overrides(&mut self, env: &EnvOverrides<'_>) {
        env.apply("WORKER_COUNT", &mut self.worker_count);
        env.apply("MAX_RETRIES", &mut self.max_retries);
        env.apply("RETRY_BASE_MS", &mut self.retry_base_ms);
        env.apply("RETRY_MAX_MS", &mut self.retry_max_ms);
        env.apply("DEPENDENCY_RETRY_MS", &mut self.dependency_retry_ms);
        env.apply("DEQUEUE_WAIT_MS", &mut self.dequeue_wait_ms);
        env.apply("HANDLER_TIMEOUT_MS", &mut self.handler_timeout_ms);
        env.apply("FINISHED_TASK_RETENTION", &mut self.finished_task_retention);
    }

    fn validate(&self) -> Result<(), PathweaveError> {
        if self.worker_count == 0 {
            return Err(PathweaveError::Config("worker_count must be >= 1".into()));
        }
        if self.retry_base_ms > self.retry_max_ms {
            return Err(PathweaveError::Config("retry_base_ms exceeds retry_max_ms".into()));
        }
        if self.finished_task_retention == 0 {
            return Err(PathweaveError::Config("finished_task_retention must be > 0".into()));
        }
        Ok(())
    }

    /// Exponential backoff before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self.retry_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.retry_max_ms))
    }

    pub fn dependency_retry(&self) -> Duration {
        Duration::from_millis(self.dependency_retry_ms)
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.graph.max_path_degree, 7);
        assert_eq!(config.graph.asymmetry_factor, 0.8);
        assert_eq!(config.graph.confidence_decay, 0.9);
        assert_eq!(config.resource.cpu, Thresholds::new(75.0, 85.0, 95.0));
        assert_eq!(config.resource.memory, Thresholds::new(75.0, 90.0, 95.0));
    }

    #[test]
    fn classify_thresholds() {
        let t = Thresholds::new(75.0, 90.0, 95.0);
        assert_eq!(t.classify(60.0), PressureLevel::Normal);
        assert_eq!(t.classify(75.0), PressureLevel::Warning);
        assert_eq!(t.classify(92.0), PressureLevel::Critical);
        assert_eq!(t.classify(99.0), PressureLevel::Emergency);
    }

    #[test]
    fn toml_partial_sections_fill_defaults() {
        let config = Config::from_toml(
            r#"
            [graph]
            max_path_degree = 5

            [orchestrator]
            worker_count = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.max_path_degree, 5);
        assert_eq!(config.graph.min_landmarks, 2);
        assert_eq!(config.orchestrator.worker_count, 2);
        assert_eq!(config.orchestrator.max_retries, 3);
    }

    #[test]
    fn toml_rejects_descending_thresholds() {
        let err = Config::from_toml(
            r#"
            [resource.memory]
            warning = 90.0
            critical = 80.0
            emergency = 95.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PathweaveError::Config(_)));
    }

    #[test]
    fn toml_rejects_inverted_landmark_bounds() {
        let err = Config::from_toml(
            r#"
            [graph]
            min_landmarks = 10
            max_landmarks = 3
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_landmarks"));
    }

    #[test]
    fn profiled_override_wins() {
        env::set_var("PWCFGTEST_MAX_PATH_DEGREE", "3");
        let config = Config::from_toml("profile = \"pwcfgtest\"").unwrap();
        env::remove_var("PWCFGTEST_MAX_PATH_DEGREE");
        assert_eq!(config.profile, "PWCFGTEST");
        assert_eq!(config.graph.max_path_degree, 3);
    }

    #[test]
    fn every_tuning_key_has_an_override() {
        let keys = [
            ("PWENVTEST_DEPENDENCY_RETRY_MS", "15"),
            ("PWENVTEST_DEQUEUE_WAIT_MS", "40"),
            ("PWENVTEST_ALERT_CAPACITY", "7"),
            ("PWENVTEST_DEGRADED_MAX_DEGREE", "2"),
            ("PWENVTEST_DEGRADED_K_CAP", "1"),
            ("PWENVTEST_FINISHED_TASK_RETENTION", "64"),
        ];
        for (key, value) in keys {
            env::set_var(key, value);
        }
        let config = Config::from_toml("profile = \"pwenvtest\"");
        for (key, _) in keys {
            env::remove_var(key);
        }
        let config = config.unwrap();
        assert_eq!(config.orchestrator.dependency_retry_ms, 15);
        assert_eq!(config.orchestrator.dequeue_wait_ms, 40);
        assert_eq!(config.resource.alert_capacity, 7);
        assert_eq!(config.graph.degraded_max_degree, 2);
        assert_eq!(config.graph.degraded_k_cap, 1);
        assert_eq!(config.orchestrator.finished_task_retention, 64);
    }

    #[test]
    fn unparsable_override_keeps_value() {
        env::set_var("PWBADTEST_WORKER_COUNT", "many");
        let config = Config::from_toml("profile = \"pwbadtest\"");
        env::remove_var("PWBADTEST_WORKER_COUNT");
        assert_eq!(config.unwrap().orchestrator.worker_count, 4);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let o = OrchestratorConfig {
            retry_base_ms: 100,
            retry_max_ms: 500,
            ..OrchestratorConfig::default()
        };
        assert_eq!(o.backoff_for(1), Duration::from_millis(100));
        assert_eq!(o.backoff_for(2), Duration::from_millis(200));
        assert_eq!(o.backoff_for(3), Duration::from_millis(400));
        assert_eq!(o.backoff_for(4), Duration::from_millis(500));
    }
}

use megascan_engine::EngineKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits above which the analytics report raises a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub init_time_ms: u64,
    pub scan_time_ms: u64,
    /// Percent of scans that needed a fallback.
    pub fallback_rate: f64,
    /// Percent of scans that failed.
    pub error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { init_time_ms: 3000, scan_time_ms: 1000, fallback_rate: 20.0, error_rate: 10.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorySettings {
    /// Engines the orchestrator may select. Selection and fallback always
    /// follow engine priority, whatever the order of this list.
    pub engines: Vec<EngineKind>,
    pub fallback_enabled: bool,
    /// Pause before each fallback attempt.
    pub fallback_delay_ms: u64,
    /// Remember the last engine that initialized successfully.
    pub cache_preference: bool,
    pub preference_key: String,
    pub metrics_key: String,
    /// History entries older than this are evicted.
    pub retention_days: u32,
    pub scan_history_limit: usize,
    pub error_history_limit: usize,
    pub thresholds: Thresholds,
}

impl FactorySettings {
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn retention(&self) -> time::Duration {
        time::Duration::days(i64::from(self.retention_days))
    }

    pub fn enabled(&self, kind: EngineKind) -> bool {
        self.engines.contains(&kind)
    }
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self {
            engines: EngineKind::ALL.to_vec(),
            fallback_enabled: true,
            fallback_delay_ms: 1000,
            cache_preference: true,
            preference_key: "mega_scan_preferred_engine".into(),
            metrics_key: "mega_scan_metrics".into(),
            retention_days: 7,
            scan_history_limit: 100,
            error_history_limit: 50,
            thresholds: Thresholds::default(),
        }
    }
}

//! Read-only views over the orchestrator state.

use crate::metrics::{ErrorRecord, Metrics, Percentiles};
use crate::settings::Thresholds;
use derive_more::Display;
use megascan_engine::{EngineInfo, EngineKind};
use serde::Serialize;
use std::time::Duration;

/// Number of recent errors included in an [`AnalyticsReport`].
const RECENT_ERRORS: usize = 5;

/// Something the orchestrator emits as it selects and runs engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FactoryEvent {
    /// An engine initialized and is now current.
    EngineSelected { kind: EngineKind, info: EngineInfo },
    /// `from` failed; `to` is the engine that took over, if any.
    Fallback { from: EngineKind, to: Option<EngineKind>, cause: String },
    Forced { from: Option<EngineKind>, to: EngineKind },
    ScanRecorded { success: bool, total_scans: u64 },
    /// Progress message suitable for a status line.
    Status { message: String },
    Destroyed { session_duration: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineAvailability {
    pub kind: EngineKind,
    pub display_name: &'static str,
    pub available: bool,
    pub priority: usize,
    pub current: bool,
}

/// Snapshot of the orchestrator's metrics with derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactoryStats {
    pub metrics: Metrics,
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub error_rate: f64,
    pub session_duration: Duration,
    pub most_used_engine: Option<EngineKind>,
    pub current_engine: Option<EngineKind>,
    pub preferred_engine: Option<EngineKind>,
    pub recommended_engine: Option<EngineKind>,
    /// Engines available on this host, in priority order.
    pub supported_engines: Vec<EngineKind>,
    pub percentiles: Option<Percentiles>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    #[display("performance")]
    Performance,
    #[display("reliability")]
    Reliability,
    #[display("compatibility")]
    Compatibility,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[display("low")]
    Low,
    #[display("medium")]
    Medium,
    #[display("high")]
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub generated_at: String,
    pub total_scans: u64,
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub error_rate: f64,
    pub session_duration: Duration,
    pub initialization_time: Duration,
    pub average_scan_time: Duration,
    pub fastest_scan: Option<Duration>,
    pub slowest_scan: Duration,
    pub percentiles: Option<Percentiles>,
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    pub recent_errors: Vec<ErrorRecord>,
    pub session_count: u64,
    pub total_usage_time: Duration,
    pub preferred_engine: Option<EngineKind>,
    pub most_used_engine: Option<EngineKind>,
    pub supported_engines: Vec<EngineKind>,
    pub recommended_engine: Option<EngineKind>,
    pub recommendations: Vec<Recommendation>,
}

impl AnalyticsReport {
    pub(crate) fn build(stats: &FactoryStats, thresholds: &Thresholds, generated_at: String) -> Self {
        let metrics = &stats.metrics;
        let skip = metrics.errors.len().saturating_sub(RECENT_ERRORS);
        Self {
            generated_at,
            total_scans: metrics.total_scans,
            success_rate: stats.success_rate,
            fallback_rate: stats.fallback_rate,
            error_rate: stats.error_rate,
            session_duration: stats.session_duration,
            initialization_time: metrics.initialization_time,
            average_scan_time: metrics.average_scan_time,
            fastest_scan: metrics.fastest_scan,
            slowest_scan: metrics.slowest_scan,
            percentiles: stats.percentiles,
            consecutive_failures: metrics.consecutive_failures,
            max_consecutive_failures: metrics.max_consecutive_failures,
            recent_errors: metrics.errors[skip..].to_vec(),
            session_count: metrics.session_count,
            total_usage_time: metrics.total_usage_time,
            preferred_engine: stats.preferred_engine,
            most_used_engine: stats.most_used_engine,
            supported_engines: stats.supported_engines.clone(),
            recommended_engine: stats.recommended_engine,
            recommendations: recommendations(stats, thresholds),
        }
    }
}

fn recommendations(stats: &FactoryStats, thresholds: &Thresholds) -> Vec<Recommendation> {
    let metrics = &stats.metrics;
    let mut out = Vec::new();
    let mut push = |kind, priority, message: String| out.push(Recommendation { kind, priority, message });

    let init = metrics.initialization_time;
    if init > Duration::from_millis(thresholds.init_time_ms) {
        push(
            RecommendationKind::Performance,
            Priority::High,
            format!("Slow initialization ({:.1} ms); consider preloading engines.", millis(init)),
        );
    }
    let scan = metrics.average_scan_time;
    if scan > Duration::from_millis(thresholds.scan_time_ms) {
        push(
            RecommendationKind::Performance,
            Priority::Medium,
            format!("Slow scans ({:.1} ms on average); check lighting and camera focus.", millis(scan)),
        );
    }
    if stats.fallback_rate > thresholds.fallback_rate {
        push(
            RecommendationKind::Reliability,
            Priority::Medium,
            format!("High fallback rate ({:.1}%); check compatibility of the primary engine.", stats.fallback_rate),
        );
    }
    if stats.supported_engines.len() == 1 {
        push(
            RecommendationKind::Compatibility,
            Priority::Low,
            "Only one engine available; a newer browser would allow faster scanning.".to_string(),
        );
    }
    if stats.error_rate > thresholds.error_rate {
        push(
            RecommendationKind::Reliability,
            Priority::High,
            format!("High error rate ({:.1}%); review camera configuration and permissions.", stats.error_rate),
        );
    }
    out
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(metrics: Metrics, supported: &[EngineKind]) -> FactoryStats {
        FactoryStats {
            success_rate: metrics.success_rate(),
            fallback_rate: metrics.fallback_rate(),
            error_rate: metrics.error_rate(),
            metrics,
            session_duration: Duration::ZERO,
            most_used_engine: None,
            current_engine: None,
            preferred_engine: None,
            recommended_engine: None,
            supported_engines: supported.to_vec(),
            percentiles: None,
        }
    }

    #[test]
    fn healthy_session_has_no_recommendations() {
        let metrics = Metrics { total_scans: 10, successful_scans: 10, ..Metrics::default() };
        let report = AnalyticsReport::build(&stats(metrics, &EngineKind::ALL), &Thresholds::default(), "now".into());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn thresholds_raise_recommendations() {
        let metrics = Metrics {
            total_scans: 10,
            successful_scans: 6,
            failed_scans: 4,
            fallbacks_used: 3,
            initialization_time: Duration::from_millis(3500),
            average_scan_time: Duration::from_millis(1500),
            ..Metrics::default()
        };
        let report =
            AnalyticsReport::build(&stats(metrics, &[EngineKind::Script]), &Thresholds::default(), "now".into());

        let kinds: Vec<_> = report.recommendations.iter().map(|r| (r.kind, r.priority)).collect();
        assert_eq!(
            kinds,
            vec![
                (RecommendationKind::Performance, Priority::High),
                (RecommendationKind::Performance, Priority::Medium),
                (RecommendationKind::Reliability, Priority::Medium),
                (RecommendationKind::Compatibility, Priority::Low),
                (RecommendationKind::Reliability, Priority::High),
            ]
        );
        assert_eq!(report.recommendations[0].message, "Slow initialization (3500.0 ms); consider preloading engines.");
    }
}

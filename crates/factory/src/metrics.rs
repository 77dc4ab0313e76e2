//! Session metrics and their persisted form.

use megascan_engine::EngineKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Errors kept across a [`Metrics::reset`].
const ERRORS_KEPT_ON_RESET: usize = 10;

/// Version tag written into the persisted metrics blob.
pub(crate) const METRICS_VERSION: &str = "2.1.0";

/// Per-engine usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineUsage {
    pub native: u64,
    pub wasm: u64,
    pub script: u64,
}

impl EngineUsage {
    pub fn get(&self, kind: EngineKind) -> u64 {
        match kind {
            EngineKind::Native => self.native,
            EngineKind::Wasm => self.wasm,
            EngineKind::Script => self.script,
        }
    }

    fn increment(&mut self, kind: EngineKind) {
        match kind {
            EngineKind::Native => self.native += 1,
            EngineKind::Wasm => self.wasm += 1,
            EngineKind::Script => self.script += 1,
        }
    }

    /// The engine used most, preferring the higher priority one on ties.
    pub fn most_used(&self) -> Option<EngineKind> {
        EngineKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind) > 0)
            .fold(None, |best, kind| match best {
                Some(best) if self.get(best) >= self.get(kind) => Some(best),
                _ => Some(kind),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub duration: Duration,
    pub engine: Option<EngineKind>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Where the error happened, e.g. `engine_init` or `scan_failure`.
    pub category: String,
    pub message: String,
    pub engine: Option<EngineKind>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub from: EngineKind,
    /// `None` when every fallback failed.
    pub to: Option<EngineKind>,
    pub cause: String,
    pub elapsed: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// History bounds applied whenever a record is appended.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HistoryLimits {
    pub scans: usize,
    pub errors: usize,
    pub retention: time::Duration,
}

/// Counters and bounded histories for one orchestrator session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub total_scans: u64,
    pub successful_scans: u64,
    pub failed_scans: u64,
    pub fallbacks_used: u64,
    pub engines_used: EngineUsage,
    pub last_engine_used: Option<EngineKind>,
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    pub errors_by_category: std::collections::BTreeMap<String, u64>,
    pub initialization_time: Duration,
    /// Exponential moving average over successful scans.
    pub average_scan_time: Duration,
    pub fastest_scan: Option<Duration>,
    pub slowest_scan: Duration,
    pub session_count: u64,
    pub total_usage_time: Duration,
    pub average_session_duration: Duration,
    pub scan_history: Vec<ScanRecord>,
    pub errors: Vec<ErrorRecord>,
    pub fallbacks: Vec<FallbackRecord>,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 * 100.0 }
}

/// Keep only the newest `limit` entries.
fn keep_last<T>(history: &mut Vec<T>, limit: usize) {
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
}

impl Metrics {
    pub fn success_rate(&self) -> f64 {
        percent(self.successful_scans, self.total_scans)
    }

    pub fn fallback_rate(&self) -> f64 {
        percent(self.fallbacks_used, self.total_scans)
    }

    pub fn error_rate(&self) -> f64 {
        percent(self.failed_scans, self.total_scans)
    }

    pub(crate) fn record_engine_used(&mut self, kind: EngineKind) {
        self.engines_used.increment(kind);
        self.last_engine_used = Some(kind);
    }

    pub(crate) fn record_success(
        &mut self,
        duration: Duration,
        engine: Option<EngineKind>,
        now: OffsetDateTime,
        limits: HistoryLimits,
    ) {
        self.total_scans += 1;
        self.successful_scans += 1;
        self.consecutive_failures = 0;
        if duration.is_zero() {
            return;
        }
        self.average_scan_time = if self.average_scan_time.is_zero() {
            duration
        } else {
            self.average_scan_time.mul_f64(0.9) + duration.mul_f64(0.1)
        };
        self.fastest_scan = Some(self.fastest_scan.map_or(duration, |fastest| fastest.min(duration)));
        self.slowest_scan = self.slowest_scan.max(duration);
        self.scan_history.push(ScanRecord { duration, engine, at: now });
        self.evict(now, limits);
    }

    pub(crate) fn record_failure(
        &mut self,
        error: Option<&str>,
        engine: Option<EngineKind>,
        now: OffsetDateTime,
        limits: HistoryLimits,
    ) {
        self.total_scans += 1;
        self.failed_scans += 1;
        self.consecutive_failures += 1;
        self.max_consecutive_failures = self.max_consecutive_failures.max(self.consecutive_failures);
        if let Some(message) = error {
            self.record_error("scan_failure", message, engine, now, limits);
        }
    }

    pub(crate) fn record_error(
        &mut self,
        category: &str,
        message: &str,
        engine: Option<EngineKind>,
        now: OffsetDateTime,
        limits: HistoryLimits,
    ) {
        *self.errors_by_category.entry(category.to_string()).or_default() += 1;
        self.errors.push(ErrorRecord {
            category: category.to_string(),
            message: message.to_string(),
            engine,
            at: now,
        });
        self.evict(now, limits);
    }

    pub(crate) fn record_fallback(&mut self, record: FallbackRecord, limits: HistoryLimits) {
        let now = record.at;
        self.fallbacks.push(record);
        self.evict(now, limits);
    }

    /// Drop history entries beyond the size limits or older than the
    /// retention window.
    pub(crate) fn evict(&mut self, now: OffsetDateTime, limits: HistoryLimits) {
        // A window reaching past the representable range keeps everything.
        if let Some(cutoff) = now.checked_sub(limits.retention) {
            self.scan_history.retain(|record| record.at > cutoff);
            self.errors.retain(|record| record.at > cutoff);
            self.fallbacks.retain(|record| record.at > cutoff);
        }
        keep_last(&mut self.scan_history, limits.scans);
        keep_last(&mut self.errors, limits.errors);
        keep_last(&mut self.fallbacks, limits.errors);
    }

    /// Zero the counters of this session and start a new one.
    ///
    /// Scan history, the last few errors, the worst failure streak and usage
    /// totals survive.
    pub(crate) fn reset(&mut self) {
        let mut errors = std::mem::take(&mut self.errors);
        keep_last(&mut errors, ERRORS_KEPT_ON_RESET);
        *self = Self {
            last_engine_used: self.last_engine_used,
            max_consecutive_failures: self.max_consecutive_failures,
            initialization_time: self.initialization_time,
            session_count: self.session_count + 1,
            total_usage_time: self.total_usage_time,
            average_session_duration: self.average_session_duration,
            scan_history: std::mem::take(&mut self.scan_history),
            errors,
            ..Self::default()
        };
    }

    /// Scan durations at the 50th, 90th, 95th and 99th percentile.
    pub fn percentiles(&self) -> Option<Percentiles> {
        let mut durations: Vec<Duration> = self.scan_history.iter().map(|record| record.duration).collect();
        if durations.is_empty() {
            return None;
        }
        durations.sort_unstable();
        Some(Percentiles {
            p50: percentile(&durations, 50),
            p90: percentile(&durations, 90),
            p95: percentile(&durations, 95),
            p99: percentile(&durations, 99),
        })
    }

    /// Fold the session length into the usage totals.
    pub(crate) fn end_session(&mut self, elapsed: Duration) {
        self.total_usage_time += elapsed;
        if self.session_count > 0 {
            self.average_session_duration = self.total_usage_time.div_f64(self.session_count as f64);
        }
    }

    pub(crate) fn persisted(&self, now: OffsetDateTime) -> PersistedMetrics {
        PersistedMetrics {
            version: METRICS_VERSION.to_string(),
            saved_at: now,
            session_count: self.session_count,
            total_usage_time: self.total_usage_time,
            average_session_duration: self.average_session_duration,
            scan_history: self.scan_history.clone(),
        }
    }

    /// Start a new session from what a previous one persisted.
    pub(crate) fn restore(persisted: PersistedMetrics, now: OffsetDateTime, limits: HistoryLimits) -> Self {
        let mut metrics = Self {
            session_count: persisted.session_count,
            total_usage_time: persisted.total_usage_time,
            average_session_duration: persisted.average_session_duration,
            scan_history: persisted.scan_history,
            ..Self::default()
        };
        metrics.evict(now, limits);
        metrics
    }
}

/// Element at index `ceil(p * n / 100) - 1` of an ascending slice.
pub(crate) fn percentile(sorted: &[Duration], p: usize) -> Duration {
    let index = (p * sorted.len()).div_ceil(100).saturating_sub(1);
    sorted[index.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// The slice of [`Metrics`] that outlives a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMetrics {
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default)]
    pub total_usage_time: Duration,
    #[serde(default)]
    pub average_session_duration: Duration,
    #[serde(default)]
    pub scan_history: Vec<ScanRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn limits() -> HistoryLimits {
        HistoryLimits { scans: 100, errors: 50, retention: time::Duration::days(7) }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let mut metrics = Metrics::default();
        for _ in 0..3 {
            metrics.record_failure(Some("camera is in use"), None, NOW, limits());
        }
        assert_eq!(metrics.consecutive_failures, 3);

        metrics.record_success(ms(400), Some(EngineKind::Native), NOW, limits());

        assert_eq!(metrics.consecutive_failures, 0);
        assert_eq!(metrics.max_consecutive_failures, 3);
        assert_eq!(metrics.total_scans, 4);
        assert_eq!(metrics.errors_by_category.get("scan_failure"), Some(&3));
    }

    #[test]
    fn scan_timings() {
        let mut metrics = Metrics::default();
        metrics.record_success(ms(200), None, NOW, limits());
        metrics.record_success(ms(1200), None, NOW, limits());
        metrics.record_success(Duration::ZERO, None, NOW, limits());

        assert!(metrics.average_scan_time.abs_diff(ms(300)) < Duration::from_micros(1));
        assert_eq!(metrics.fastest_scan, Some(ms(200)));
        assert_eq!(metrics.slowest_scan, ms(1200));
        // Zero-length scans count but are not timed.
        assert_eq!(metrics.successful_scans, 3);
        assert_eq!(metrics.scan_history.len(), 2);
    }

    #[test]
    fn histories_are_bounded() {
        let mut metrics = Metrics::default();
        for i in 1..=120 {
            metrics.record_success(ms(i), None, NOW, limits());
            metrics.record_error("engine_init", "boom", None, NOW, limits());
        }
        assert_eq!(metrics.scan_history.len(), 100);
        assert_eq!(metrics.scan_history[0].duration, ms(21));
        assert_eq!(metrics.errors.len(), 50);
    }

    #[test]
    fn expired_entries_are_evicted() {
        let mut metrics = Metrics::default();
        metrics.record_success(ms(100), None, NOW - time::Duration::days(8), limits());
        metrics.record_error("engine_init", "old", None, NOW - time::Duration::days(8), limits());
        metrics.record_success(ms(200), None, NOW, limits());

        assert_eq!(metrics.scan_history.len(), 1);
        assert!(metrics.errors.is_empty());
    }

    #[test]
    fn oversized_retention_keeps_history() {
        let limits = HistoryLimits { retention: time::Duration::days(5_000_000), ..limits() };
        let mut metrics = Metrics::default();
        metrics.record_success(ms(100), None, NOW - time::Duration::days(8), limits);
        metrics.record_failure(Some("camera is in use"), None, NOW, limits);
        metrics.record_success(ms(200), None, NOW, limits);

        assert_eq!(metrics.scan_history.len(), 2);
        assert_eq!(metrics.errors.len(), 1);
    }

    #[test]
    fn reset_keeps_histories() {
        let mut metrics = Metrics { session_count: 4, ..Metrics::default() };
        for i in 0..15 {
            metrics.record_failure(Some(format!("error {i}").as_str()), None, NOW, limits());
        }
        metrics.record_success(ms(300), Some(EngineKind::Wasm), NOW, limits());
        metrics.record_engine_used(EngineKind::Wasm);

        metrics.reset();

        assert_eq!(metrics.total_scans, 0);
        assert_eq!(metrics.failed_scans, 0);
        assert_eq!(metrics.engines_used, EngineUsage::default());
        assert_eq!(metrics.average_scan_time, Duration::ZERO);
        assert_eq!(metrics.max_consecutive_failures, 15);
        assert_eq!(metrics.session_count, 5);
        assert_eq!(metrics.scan_history.len(), 1);
        assert_eq!(metrics.errors.len(), 10);
        assert_eq!(metrics.errors[0].message, "error 5");
    }

    #[rstest]
    #[case(&[100], 50, 100)]
    #[case(&[100, 200], 50, 100)]
    #[case(&[100, 200, 300, 400], 50, 200)]
    #[case(&[100, 200, 300, 400], 90, 400)]
    #[case(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100], 90, 90)]
    #[case(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100], 95, 100)]
    fn percentile_index(#[case] sorted: &[u64], #[case] p: usize, #[case] expected: u64) {
        let sorted: Vec<Duration> = sorted.iter().copied().map(ms).collect();
        assert_eq!(percentile(&sorted, p), ms(expected));
    }

    #[test]
    fn rates() {
        let mut metrics = Metrics::default();
        assert_eq!(metrics.success_rate(), 0.0);
        metrics.record_success(ms(1), None, NOW, limits());
        metrics.record_failure(None, None, NOW, limits());
        metrics.fallbacks_used = 1;
        assert_eq!(metrics.success_rate(), 50.0);
        assert_eq!(metrics.error_rate(), 50.0);
        assert_eq!(metrics.fallback_rate(), 50.0);
    }

    #[test]
    fn most_used_engine() {
        let mut usage = EngineUsage::default();
        assert_eq!(usage.most_used(), None);
        usage.increment(EngineKind::Script);
        usage.increment(EngineKind::Wasm);
        assert_eq!(usage.most_used(), Some(EngineKind::Wasm));
        usage.increment(EngineKind::Script);
        assert_eq!(usage.most_used(), Some(EngineKind::Script));
    }
}

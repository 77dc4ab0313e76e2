use crate::error::{ErrorKind, Result};
use crate::metrics::{FallbackRecord, HistoryLimits, Metrics, PersistedMetrics};
use crate::registry::Registry;
use crate::report::{AnalyticsReport, EngineAvailability, FactoryEvent, FactoryStats};
use crate::settings::FactorySettings;
use crate::store::KeyValueStore;
use exn::{OptionExt, ResultExt};
use megascan_detect::CapabilityDetector;
use megascan_engine::error::ErrorKind as EngineErrorKind;
use megascan_engine::host::Host;
use megascan_engine::{EngineHandle, EngineInfo, EngineKind, EngineLifecycle, EngineSettings, ScanOptions};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{OnceCell, broadcast};
use tokio::time::Instant;
use tracing::instrument;

const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct State {
    current: Option<EngineKind>,
    engine: Option<EngineHandle>,
    instances: BTreeMap<EngineKind, EngineHandle>,
    metrics: Metrics,
    recommended: Option<EngineKind>,
    supported: Vec<EngineKind>,
    session_started: Option<Instant>,
}

/// Owns the engine instances of a session: selects one, falls back when it
/// fails, and keeps the metrics that drive future selections.
///
/// At most one cached engine holds the camera at a time; every other one is
/// stopped before an engine is initialized.
pub struct EngineOrchestrator {
    host: Host,
    settings: FactorySettings,
    engine_settings: EngineSettings,
    registry: Registry,
    detector: Arc<CapabilityDetector>,
    store: Arc<dyn KeyValueStore>,
    ready: Mutex<Arc<OnceCell<EngineKind>>>,
    /// Serializes engine switches, which await while holding the camera.
    selection: tokio::sync::Mutex<()>,
    state: Mutex<State>,
    events: broadcast::Sender<FactoryEvent>,
}

impl EngineOrchestrator {
    pub fn new(host: Host, store: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            detector: Arc::new(CapabilityDetector::new(host.clone())),
            host,
            settings: FactorySettings::default(),
            engine_settings: EngineSettings::default(),
            registry: Registry::builtin(),
            store,
            ready: Mutex::new(Arc::new(OnceCell::new())),
            selection: tokio::sync::Mutex::new(()),
            state: Mutex::new(State::default()),
            events,
        }
    }

    pub fn with_settings(mut self, settings: FactorySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_engine_settings(mut self, settings: EngineSettings) -> Self {
        self.engine_settings = settings;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Share a detector, and its cached report, with other components.
    pub fn with_detector(mut self, detector: Arc<CapabilityDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn detector(&self) -> &Arc<CapabilityDetector> {
        &self.detector
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FactoryEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: FactoryEvent) {
        // Nobody listening is fine.
        self.events.send(event).ok();
    }

    fn status(&self, message: String) {
        tracing::debug!(status = %message);
        self.emit(FactoryEvent::Status { message });
    }

    fn limits(&self) -> HistoryLimits {
        HistoryLimits {
            scans: self.settings.scan_history_limit,
            errors: self.settings.error_history_limit,
            retention: self.settings.retention(),
        }
    }

    /// Detect capabilities and pick the initial engine. Runs once; later
    /// calls return the current engine kind.
    pub async fn initialize(&self) -> Result<EngineKind> {
        let ready = Arc::clone(&self.ready.lock().unwrap_or_else(PoisonError::into_inner));
        let initial = *ready.get_or_try_init(|| self.bootstrap()).await?;
        Ok(self.lock().current.unwrap_or(initial))
    }

    #[instrument(skip_all)]
    async fn bootstrap(&self) -> Result<EngineKind> {
        let started = Instant::now();
        let report = self.detector.detect().await;
        let recommended = report.recommended_engine();
        let supported: Vec<EngineKind> = self
            .registry
            .kinds()
            .filter(|kind| self.settings.enabled(*kind) && report.is_engine_available(*kind))
            .collect();

        let selected = match self.preferred_engine() {
            Some(preferred) if supported.contains(&preferred) => {
                tracing::info!(engine = %preferred, "using cached engine preference");
                preferred
            },
            _ => supported
                .iter()
                .copied()
                .find(|kind| *kind >= recommended)
                .or_else(|| supported.first().copied())
                .ok_or_raise(|| ErrorKind::Unregistered(recommended))?,
        };

        let now = OffsetDateTime::now_utc();
        let mut metrics = self.load_metrics(now);
        metrics.session_count += 1;
        metrics.initialization_time = started.elapsed();
        let elapsed = metrics.initialization_time;
        {
            let mut state = self.lock();
            state.current = Some(selected);
            state.recommended = Some(recommended);
            state.supported = supported;
            state.metrics = metrics;
            state.session_started = Some(started);
        }
        self.save_metrics();

        if elapsed > Duration::from_millis(self.settings.thresholds.init_time_ms) {
            tracing::warn!(elapsed = ?elapsed, "slow orchestrator initialization");
        }
        tracing::info!(engine = %selected, recommended = %recommended, elapsed = ?elapsed, "orchestrator initialized");
        Ok(selected)
    }

    /// Initialize the current engine on `surface`, falling back to later
    /// engines if it fails.
    #[instrument(skip_all, fields(surface = %surface))]
    pub async fn get_engine(&self, surface: &str, options: &ScanOptions) -> Result<EngineHandle> {
        self.initialize().await?;
        let _selection = self.selection.lock().await;
        let kind = self.initialize().await?;
        self.status(format!("Preparing {kind} engine..."));

        let started = Instant::now();
        let err = match self.activate(kind, surface, options).await {
            Ok(engine) => {
                self.promote(kind, &engine);
                tracing::info!(engine = %kind, elapsed = ?started.elapsed(), "engine ready");
                return Ok(engine);
            },
            Err(err) => err,
        };

        tracing::warn!(engine = %kind, error = ?err, "engine failed to initialize");
        self.record_error("engine_init", &err.to_string(), Some(kind));
        if !self.settings.fallback_enabled {
            return Err(err);
        }
        self.fallback(kind, surface, options, err, started).await
    }

    /// Try every enabled engine after `failed`, in priority order.
    async fn fallback(
        &self,
        failed: EngineKind,
        surface: &str,
        options: &ScanOptions,
        err: crate::error::Error,
        started: Instant,
    ) -> Result<EngineHandle> {
        let cause = cause_of(&err);
        self.lock().metrics.fallbacks_used += 1;
        tracing::info!(engine = %failed, cause = %cause, "starting fallback sequence");

        let mut attempted = vec![failed];
        let candidates = failed.successors().filter(|kind| self.settings.enabled(*kind) && self.registry.contains(*kind));
        for kind in candidates {
            if !self.is_available(kind).await {
                tracing::debug!(engine = %kind, "fallback engine unavailable; skipping");
                continue;
            }
            self.status(format!("Trying alternative engine {kind}..."));
            tokio::time::sleep(self.settings.fallback_delay()).await;
            attempted.push(kind);
            match self.activate(kind, surface, options).await {
                Ok(engine) => {
                    self.record_fallback(failed, Some(kind), &cause, started.elapsed());
                    self.promote(kind, &engine);
                    tracing::info!(from = %failed, to = %kind, elapsed = ?started.elapsed(), "fallback succeeded");
                    return Ok(engine);
                },
                Err(err) => {
                    tracing::warn!(engine = %kind, error = ?err, "fallback engine failed");
                    self.record_error("fallback", &err.to_string(), Some(kind));
                },
            }
        }

        self.record_fallback(failed, None, &cause, started.elapsed());
        let exhausted = ErrorKind::AllEnginesExhausted { attempted, cause };
        self.record_error("all_engines_failed", &exhausted.to_string(), None);
        tracing::error!(error = %exhausted, "every scanning engine failed");
        Err(err).or_raise(|| exhausted)
    }

    /// Stop the other engines, then initialize `kind`. A failed instance is
    /// disposed and evicted from the cache.
    async fn activate(&self, kind: EngineKind, surface: &str, options: &ScanOptions) -> Result<EngineHandle> {
        let engine = self.instance(kind)?;
        if !engine.check_available().await {
            exn::bail!(ErrorKind::Engine(EngineErrorKind::Unavailable(kind)));
        }

        let others: Vec<EngineHandle> = {
            let state = self.lock();
            state.instances.iter().filter(|(other, _)| **other != kind).map(|(_, engine)| Arc::clone(engine)).collect()
        };
        for other in others {
            if other.lifecycle().is_live() {
                tracing::debug!(engine = %other.kind(), "releasing camera");
            }
            other.stop().await;
        }

        if let Err(err) = engine.initialize(surface, options).await {
            let cause = (*err).clone();
            self.discard(kind, &engine).await;
            return Err(err).or_raise(|| ErrorKind::Engine(cause));
        }
        Ok(engine)
    }

    /// The cached instance of `kind`, or a fresh one if there is none or it
    /// was disposed.
    fn instance(&self, kind: EngineKind) -> Result<EngineHandle> {
        let mut state = self.lock();
        if let Some(engine) = state.instances.get(&kind)
            && engine.lifecycle() != EngineLifecycle::Disposed
        {
            return Ok(Arc::clone(engine));
        }
        let engine = self
            .registry
            .create(kind, &self.host, &self.engine_settings)
            .ok_or_raise(|| ErrorKind::Unregistered(kind))?;
        tracing::debug!(engine = %kind, "created engine instance");
        state.instances.insert(kind, Arc::clone(&engine));
        Ok(engine)
    }

    async fn discard(&self, kind: EngineKind, engine: &EngineHandle) {
        {
            let mut state = self.lock();
            if state.instances.get(&kind).is_some_and(|cached| Arc::ptr_eq(cached, engine)) {
                state.instances.remove(&kind);
            }
            if state.engine.as_ref().is_some_and(|current| Arc::ptr_eq(current, engine)) {
                state.engine = None;
            }
        }
        if let Err(err) = engine.dispose().await {
            tracing::warn!(engine = %kind, error = ?err, "failed to dispose engine");
        }
    }

    async fn is_available(&self, kind: EngineKind) -> bool {
        if !self.detector.is_engine_available(kind).await {
            return false;
        }
        match self.instance(kind) {
            Ok(engine) => engine.check_available().await,
            Err(_) => false,
        }
    }

    fn promote(&self, kind: EngineKind, engine: &EngineHandle) {
        {
            let mut state = self.lock();
            state.current = Some(kind);
            state.engine = Some(Arc::clone(engine));
            state.metrics.record_engine_used(kind);
        }
        self.cache_preference(kind);
        self.save_metrics();
        self.status(format!("Engine {kind} ready"));
        self.emit(FactoryEvent::EngineSelected { kind, info: engine.describe() });
    }

    fn record_error(&self, category: &str, message: &str, engine: Option<EngineKind>) {
        let limits = self.limits();
        self.lock().metrics.record_error(category, message, engine, OffsetDateTime::now_utc(), limits);
    }

    fn record_fallback(&self, from: EngineKind, to: Option<EngineKind>, cause: &EngineErrorKind, elapsed: Duration) {
        let limits = self.limits();
        let record = FallbackRecord { from, to, cause: cause.to_string(), elapsed, at: OffsetDateTime::now_utc() };
        self.lock().metrics.record_fallback(record, limits);
        self.save_metrics();
        self.emit(FactoryEvent::Fallback { from, to, cause: cause.to_string() });
    }

    pub fn record_scan_success(&self, duration: Duration) {
        let limits = self.limits();
        let total_scans = {
            let mut state = self.lock();
            let engine = state.current;
            state.metrics.record_success(duration, engine, OffsetDateTime::now_utc(), limits);
            state.metrics.total_scans
        };
        if duration > Duration::from_millis(self.settings.thresholds.scan_time_ms) {
            tracing::warn!(elapsed = ?duration, "slow scan");
        }
        self.save_metrics();
        self.emit(FactoryEvent::ScanRecorded { success: true, total_scans });
    }

    pub fn record_scan_failure(&self, error: Option<&str>) {
        let limits = self.limits();
        let total_scans = {
            let mut state = self.lock();
            let engine = state.current;
            state.metrics.record_failure(error, engine, OffsetDateTime::now_utc(), limits);
            state.metrics.total_scans
        };
        self.save_metrics();
        self.emit(FactoryEvent::ScanRecorded { success: false, total_scans });
    }

    /// Make `name` the engine of the next [`get_engine`](Self::get_engine),
    /// bypassing the selection policy. The current engine is stopped.
    pub async fn force_engine(&self, name: &str) -> Result<EngineKind> {
        let kind = name
            .parse::<EngineKind>()
            .or_raise(|| ErrorKind::Engine(EngineErrorKind::UnknownEngine(name.into())))?;
        if !self.registry.contains(kind) {
            exn::bail!(ErrorKind::Unregistered(kind));
        }
        self.initialize().await?;
        let _selection = self.selection.lock().await;
        let (from, engine) = {
            let mut state = self.lock();
            (state.current.replace(kind), state.engine.take())
        };
        if let Some(engine) = engine {
            engine.stop().await;
        }
        tracing::info!(from = ?from, to = %kind, "engine forced");
        self.emit(FactoryEvent::Forced { from, to: kind });
        Ok(kind)
    }

    /// Every registered engine with its availability on this host.
    pub async fn available_engines(&self) -> Vec<EngineAvailability> {
        let current = self.lock().current;
        let mut engines = Vec::new();
        for kind in self.registry.kinds() {
            engines.push(EngineAvailability {
                kind,
                display_name: kind.display_name(),
                available: self.settings.enabled(kind) && self.is_available(kind).await,
                priority: kind.priority(),
                current: current == Some(kind),
            });
        }
        engines
    }

    pub fn current_engine_info(&self) -> Option<EngineInfo> {
        let engine = self.lock().engine.clone();
        engine.map(|engine| engine.describe())
    }

    pub fn stats(&self) -> FactoryStats {
        let preferred_engine = self.preferred_engine();
        let state = self.lock();
        let metrics = state.metrics.clone();
        FactoryStats {
            success_rate: metrics.success_rate(),
            fallback_rate: metrics.fallback_rate(),
            error_rate: metrics.error_rate(),
            session_duration: state.session_started.map_or(Duration::ZERO, |started| started.elapsed()),
            most_used_engine: metrics.engines_used.most_used(),
            current_engine: state.current,
            preferred_engine,
            recommended_engine: state.recommended,
            supported_engines: state.supported.clone(),
            percentiles: metrics.percentiles(),
            metrics,
        }
    }

    pub fn analytics_report(&self) -> AnalyticsReport {
        AnalyticsReport::build(&self.stats(), &self.settings.thresholds, timestamp(OffsetDateTime::now_utc()))
    }

    /// Metrics, analytics and capabilities as one JSON document.
    pub fn export_metrics(&self) -> serde_json::Value {
        let stats = self.stats();
        let report = AnalyticsReport::build(&stats, &self.settings.thresholds, timestamp(OffsetDateTime::now_utc()));
        serde_json::json!({
            "version": crate::metrics::METRICS_VERSION,
            "exported_at": report.generated_at,
            "stats": stats,
            "report": report,
            "capabilities": self.detector.cached(),
        })
    }

    /// Zero the session counters; histories and usage totals survive.
    pub fn reset_stats(&self) {
        {
            let mut state = self.lock();
            state.metrics.reset();
            state.session_started = Some(Instant::now());
        }
        tracing::info!("orchestrator statistics reset");
        self.save_metrics();
    }

    /// Persist metrics and dispose every cached engine. Disposal errors are
    /// logged, never returned.
    #[instrument(skip_all)]
    pub async fn destroy(&self) {
        let _selection = self.selection.lock().await;
        let (session_duration, instances) = {
            let mut state = self.lock();
            let elapsed = state.session_started.map_or(Duration::ZERO, |started| started.elapsed());
            state.metrics.end_session(elapsed);
            (elapsed, std::mem::take(&mut state.instances))
        };
        self.save_metrics();

        for (kind, engine) in instances {
            match engine.dispose().await {
                Ok(()) => tracing::debug!(engine = %kind, "engine disposed"),
                Err(err) => tracing::warn!(engine = %kind, error = ?err, "failed to dispose engine"),
            }
        }

        *self.lock() = State::default();
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new());
        tracing::info!(elapsed = ?session_duration, "orchestrator destroyed");
        self.emit(FactoryEvent::Destroyed { session_duration });
    }

    fn preferred_engine(&self) -> Option<EngineKind> {
        if !self.settings.cache_preference {
            return None;
        }
        match self.store.get(&self.settings.preference_key) {
            Ok(Some(value)) => match value.parse() {
                Ok(kind) => Some(kind),
                Err(err) => {
                    tracing::warn!(value = %value, error = ?err, "ignoring invalid engine preference");
                    None
                },
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = ?err, "failed to read engine preference");
                None
            },
        }
    }

    fn cache_preference(&self, kind: EngineKind) {
        if !self.settings.cache_preference {
            return;
        }
        if let Err(err) = self.store.set(&self.settings.preference_key, kind.as_str()) {
            tracing::warn!(engine = %kind, error = ?err, "failed to cache engine preference");
        }
    }

    fn load_metrics(&self, now: OffsetDateTime) -> Metrics {
        let stored = match self.store.get(&self.settings.metrics_key) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(error = ?err, "failed to read persisted metrics");
                None
            },
        };
        let Some(stored) = stored else {
            return Metrics::default();
        };
        match serde_json::from_str::<PersistedMetrics>(&stored) {
            Ok(persisted) => {
                tracing::debug!(version = %persisted.version, scans = persisted.scan_history.len(), "persisted metrics loaded");
                Metrics::restore(persisted, now, self.limits())
            },
            Err(err) => {
                tracing::warn!(error = %err, "persisted metrics are corrupt; starting fresh");
                Metrics::default()
            },
        }
    }

    fn save_metrics(&self) {
        let persisted = self.lock().metrics.persisted(OffsetDateTime::now_utc());
        let json = match serde_json::to_string(&persisted) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize metrics");
                return;
            },
        };
        if let Err(err) = self.store.set(&self.settings.metrics_key, &json) {
            tracing::warn!(error = ?err, "failed to persist metrics");
        }
    }
}

/// The engine failure behind an orchestrator error.
fn cause_of(err: &crate::error::Error) -> EngineErrorKind {
    match err.engine_cause() {
        Some(cause) => cause.clone(),
        None => EngineErrorKind::UnknownEngineError(err.to_string()),
    }
}

fn timestamp(now: OffsetDateTime) -> String {
    now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

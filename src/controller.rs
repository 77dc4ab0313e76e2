use crate::device::DeviceClass;
use crate::error::{ErrorKind, Result};
use crate::events::ScannerEvents;
use crate::messages::user_message;
use megascan_config::Config;
use megascan_engine::error::ErrorKind as EngineErrorKind;
use megascan_engine::host::{Constraints, Host, PermissionState};
use megascan_engine::{EngineHandle, EngineInfo, EngineLifecycle, ScanObserver, ScanOptions, ScanResult};
use megascan_factory::{EngineOrchestrator, KeyValueStore};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;

/// Outcomes seen by this controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerStats {
    pub sessions_started: u64,
    pub successful_scans: u64,
    pub failed_scans: u64,
    pub last_result: Option<ScanResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    /// An engine was started and has not finished yet.
    pub initialized: bool,
    pub permission: PermissionState,
    pub scanning: bool,
    pub engine: Option<EngineInfo>,
    pub stats: ControllerStats,
}

#[derive(Default)]
struct ControllerState {
    permission: PermissionState,
    /// Permission was requested during this page lifetime.
    requested: bool,
    /// Set by a refused request; only a page reload clears it.
    denied: bool,
    initialized: bool,
    engine: Option<EngineHandle>,
    stats: ControllerStats,
}

/// State shared between the controller and the observer of a running scan.
#[derive(Clone)]
struct Shared {
    orchestrator: Arc<EngineOrchestrator>,
    events: Arc<dyn ScannerEvents>,
    state: Arc<Mutex<ControllerState>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, message: &str) {
        tracing::debug!(status = message);
        self.events.on_status_update(message);
    }

    fn report(&self, error: &ErrorKind) {
        let message = user_message(error);
        self.status(&message);
        self.events.on_scan_error(error, &message);
    }

    fn set_permission(&self, permission: PermissionState) {
        let previous = std::mem::replace(&mut self.lock().permission, permission);
        if previous != permission {
            tracing::info!(from = %previous, to = %permission, "camera permission changed");
            self.events.on_permission_change(permission);
        }
    }

    /// Forget the running engine and return it, if any.
    fn finish(&self) -> Option<EngineHandle> {
        let mut state = self.lock();
        state.initialized = false;
        state.engine.take()
    }
}

struct SessionObserver(Shared);

impl ScanObserver for SessionObserver {
    fn on_success(&self, result: ScanResult) {
        tracing::info!(engine = %result.engine, format = %result.format, elapsed = ?result.scan_duration, "code scanned");
        self.0.finish();
        {
            let mut state = self.0.lock();
            state.stats.successful_scans += 1;
            state.stats.last_result = Some(result.clone());
        }
        self.0.orchestrator.record_scan_success(result.scan_duration);
        self.0.events.on_scan_success(&result);
    }

    fn on_error(&self, error: EngineErrorKind) {
        tracing::warn!(error = %error, "scan session failed");
        self.0.finish();
        self.0.lock().stats.failed_scans += 1;
        self.0.orchestrator.record_scan_failure(Some(&error.to_string()));
        self.0.report(&ErrorKind::Engine(error));
    }
}

/// Application-facing scanner: guards camera permission, then runs the
/// engine the orchestrator selects.
///
/// Permission moves through [`PermissionState`] only in response to a
/// status query, an explicit request, or the device heuristic that spots a
/// desktop without a camera before anything prompts the user.
pub struct ScannerController {
    host: Host,
    options: ScanOptions,
    shared: Shared,
}

impl ScannerController {
    pub fn new(host: Host, orchestrator: Arc<EngineOrchestrator>) -> Self {
        Self {
            host,
            options: ScanOptions::default(),
            shared: Shared {
                orchestrator,
                events: Arc::new(()),
                state: Arc::new(Mutex::new(ControllerState::default())),
            },
        }
    }

    /// A controller whose orchestrator uses the built-in engines.
    pub fn from_config(host: Host, store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        let orchestrator = EngineOrchestrator::new(host.clone(), store)
            .with_settings(config.factory.clone())
            .with_engine_settings(config.engines.clone());
        Self::new(host, Arc::new(orchestrator))
    }

    pub fn with_events(mut self, events: Arc<dyn ScannerEvents>) -> Self {
        self.shared.events = events;
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn orchestrator(&self) -> &Arc<EngineOrchestrator> {
        &self.shared.orchestrator
    }

    pub fn permission(&self) -> PermissionState {
        self.shared.lock().permission
    }

    /// Current permission, without ever prompting.
    ///
    /// Hosts without a permission query fall back to the video inputs:
    /// device labels are only exposed once access was granted.
    #[instrument(skip_all)]
    pub async fn check_permission_status(&self) -> PermissionState {
        let permission = match self.host.camera.query_permission().await {
            Ok(permission) => permission,
            Err(fault) => {
                tracing::debug!(fault = %fault, "permission query unavailable; inspecting video inputs");
                self.permission_from_devices().await
            },
        };
        self.shared.set_permission(permission);
        permission
    }

    async fn permission_from_devices(&self) -> PermissionState {
        match self.host.camera.devices().await {
            Ok(devices) if devices.is_empty() && DeviceClass::detect(&*self.host.platform).is_desktop() => {
                PermissionState::DesktopNoCamera
            },
            Ok(devices) if devices.iter().any(|device| !device.label.is_empty()) => PermissionState::Granted,
            Ok(_) => PermissionState::Prompt,
            Err(fault) => {
                tracing::warn!(fault = %fault, "failed to enumerate video inputs");
                PermissionState::Unknown
            },
        }
    }

    /// Prompt for camera access by opening, then immediately releasing, a
    /// stream with the basic constraints.
    #[instrument(skip_all)]
    pub async fn request_permission(&self) -> Result<PermissionState> {
        self.shared.status("Requesting camera permission...");
        self.shared.lock().requested = true;
        match self.host.camera.open(&Constraints::basic()).await {
            Ok(stream) => {
                stream.stop();
                self.shared.set_permission(PermissionState::Granted);
                Ok(PermissionState::Granted)
            },
            Err(fault) => {
                let kind = EngineErrorKind::from_camera_fault(&fault);
                tracing::warn!(fault = %fault, error = %kind, "camera permission request failed");
                if kind == EngineErrorKind::PermissionDenied {
                    self.shared.lock().denied = true;
                    self.shared.set_permission(PermissionState::Denied);
                }
                exn::bail!(ErrorKind::Engine(kind))
            },
        }
    }

    /// Page-level reload: a denied permission may be asked for again.
    pub fn page_reloaded(&self) {
        let denied = {
            let mut state = self.shared.lock();
            state.denied = false;
            state.requested = false;
            state.permission == PermissionState::Denied
        };
        if denied {
            self.shared.set_permission(PermissionState::Unknown);
        }
    }

    pub async fn check_compatibility(&self) -> Result<()> {
        if !self.host.is_secure() {
            exn::bail!(ErrorKind::HttpsRequired);
        }
        let desktop = DeviceClass::detect(&*self.host.platform).is_desktop();
        if !self.host.camera.is_supported() {
            exn::bail!(if desktop { ErrorKind::DesktopNoCamera } else { ErrorKind::CameraUnsupported });
        }
        if desktop
            && let Ok(devices) = self.host.camera.devices().await
            && devices.is_empty()
        {
            self.shared.set_permission(PermissionState::DesktopNoCamera);
            exn::bail!(ErrorKind::DesktopNoCamera);
        }
        Ok(())
    }

    /// Make sure a camera stream can be obtained. Does not start decoding.
    ///
    /// Errors are also reported through [`ScannerEvents::on_scan_error`].
    #[instrument(skip_all)]
    pub async fn activate_camera(&self) -> Result<()> {
        let result = self.try_activate().await;
        if let Err(err) = &result {
            self.shared.report(err);
        }
        result
    }

    async fn try_activate(&self) -> Result<()> {
        let (permission, requested, denied) = {
            let state = self.shared.lock();
            (state.permission, state.requested, state.denied)
        };
        if permission == PermissionState::Granted && requested {
            tracing::debug!("camera already activated");
            return Ok(());
        }

        self.shared.status("Checking compatibility...");
        self.check_compatibility().await?;
        if denied || permission == PermissionState::Denied {
            exn::bail!(ErrorKind::Engine(EngineErrorKind::PermissionDenied));
        }
        self.request_permission().await?;
        tracing::info!("camera activated");
        Ok(())
    }

    /// Start scanning on `surface`. Failures are reported through
    /// [`ScannerEvents::on_scan_error`] and yield `false`.
    #[instrument(skip_all, fields(surface = %surface))]
    pub async fn initialize_scanner(&self, surface: &str) -> bool {
        if self.permission() != PermissionState::Granted {
            tracing::info!(permission = %self.permission(), "camera permission not granted");
            return false;
        }
        match self.start_engine(surface).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = ?err, "failed to start scanner");
                self.shared.finish();
                self.shared.report(&err);
                false
            },
        }
    }

    async fn start_engine(&self, surface: &str) -> Result<()> {
        self.stop().await;
        self.shared.status("Starting camera...");
        let engine = self
            .shared
            .orchestrator
            .get_engine(surface, &self.options)
            .await
            .map_err(ErrorKind::factory)?;

        {
            let mut state = self.shared.lock();
            state.engine = Some(Arc::clone(&engine));
            state.initialized = true;
            state.stats.sessions_started += 1;
        }
        let observer = Arc::new(SessionObserver(self.shared.clone()));
        engine.start(observer).await.map_err(ErrorKind::engine)?;
        self.shared.status("Looking for a code...");
        tracing::info!(engine = %engine.kind(), "scanner started");
        Ok(())
    }

    /// Stop the running engine, if any.
    pub async fn stop(&self) {
        if let Some(engine) = self.shared.finish() {
            tracing::debug!(engine = %engine.kind(), "stopping scanner");
            engine.stop().await;
        }
    }

    pub async fn destroy(&self) {
        self.stop().await;
        self.shared.orchestrator.destroy().await;
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.shared.lock();
        let engine = state.engine.as_ref();
        ControllerStatus {
            initialized: state.initialized,
            permission: state.permission,
            scanning: engine.is_some_and(|engine| engine.lifecycle() == EngineLifecycle::Scanning),
            engine: engine.map(|engine| engine.describe()),
            stats: state.stats.clone(),
        }
    }
}
